//! TCP protocol between a frame client and the pose server.
//!
//! Length-delimited frames, each carrying one bincode-encoded message.

use std::io;

use bytes::{Bytes, BytesMut};
use futures::{Sink, SinkExt, Stream, StreamExt};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;
use tokio_util::codec::{Framed, LengthDelimitedCodec};

use crate::alignment::AlignmentTransform;
use crate::session::{AdjustAction, FrameResult};

const MAX_FRAME_LENGTH: usize = 16 * 1024 * 1024;

/// Client → server
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub enum ClientMessage {
    /// One camera frame, JPEG encoded
    Frame { timestamp_us: u64, jpeg_data: Vec<u8> },
    AdjustPose { action: AdjustAction },
    Ping,
}

/// Server → client
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub enum ServerMessage {
    Status { message: String },
    /// Annotated frame; `score` is absent when either pose was missing
    ProcessedFrame { jpeg_data: Vec<u8>, score: Option<f32> },
    PoseAdjusted { offset_x: f32, offset_y: f32, scale: f32 },
    Pong,
}

impl From<FrameResult> for ServerMessage {
    fn from(result: FrameResult) -> Self {
        ServerMessage::ProcessedFrame {
            jpeg_data: result.image,
            score: result.score,
        }
    }
}

impl From<AlignmentTransform> for ServerMessage {
    fn from(t: AlignmentTransform) -> Self {
        ServerMessage::PoseAdjusted {
            offset_x: t.offset_x,
            offset_y: t.offset_y,
            scale: t.scale,
        }
    }
}

pub type MessageStream = Framed<TcpStream, LengthDelimitedCodec>;

/// Create a framed message stream with length-delimited framing.
pub fn message_stream<T: AsyncRead + AsyncWrite>(io: T) -> Framed<T, LengthDelimitedCodec> {
    let codec = LengthDelimitedCodec::builder()
        .max_frame_length(MAX_FRAME_LENGTH)
        .new_codec();
    Framed::new(io, codec)
}

/// Send a serializable message (bincode + length prefix).
pub async fn send_message<S, T>(sink: &mut S, msg: &T) -> anyhow::Result<()>
where
    S: Sink<Bytes, Error = io::Error> + Unpin,
    T: Serialize,
{
    let data = bincode::serialize(msg)?;
    sink.send(Bytes::from(data)).await?;
    Ok(())
}

/// Receive and deserialize a message. `Ok(None)` means the peer closed the
/// connection cleanly.
pub async fn recv_message<S, T>(stream: &mut S) -> anyhow::Result<Option<T>>
where
    S: Stream<Item = Result<BytesMut, io::Error>> + Unpin,
    T: DeserializeOwned,
{
    match stream.next().await {
        Some(Ok(bytes)) => Ok(Some(bincode::deserialize(&bytes)?)),
        Some(Err(e)) => Err(e.into()),
        None => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;

    #[tokio::test]
    async fn test_messages_over_tcp() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let server = tokio::spawn(async move {
            let (socket, _) = listener.accept().await.unwrap();
            let mut stream = message_stream(socket);
            let mut received = Vec::new();
            while let Some(msg) = recv_message::<_, ClientMessage>(&mut stream).await.unwrap() {
                received.push(msg);
            }
            received
        });

        let mut client = message_stream(TcpStream::connect(addr).await.unwrap());
        let frame = ClientMessage::Frame {
            timestamp_us: 42,
            jpeg_data: vec![0xFF, 0xD8, 1, 2, 3],
        };
        send_message(&mut client, &frame).await.unwrap();
        send_message(
            &mut client,
            &ClientMessage::AdjustPose {
                action: AdjustAction::ScaleUp,
            },
        )
        .await
        .unwrap();
        send_message(&mut client, &ClientMessage::Ping).await.unwrap();
        drop(client);

        let received = server.await.unwrap();
        assert_eq!(received.len(), 3);
        assert_eq!(received[0], frame);
        assert_eq!(
            received[1],
            ClientMessage::AdjustPose {
                action: AdjustAction::ScaleUp
            }
        );
        assert_eq!(received[2], ClientMessage::Ping);
    }

    #[test]
    fn test_frame_result_conversion() {
        let msg = ServerMessage::from(FrameResult {
            image: vec![9, 9],
            score: Some(81.5),
        });
        assert_eq!(
            msg,
            ServerMessage::ProcessedFrame {
                jpeg_data: vec![9, 9],
                score: Some(81.5)
            }
        );
    }
}
