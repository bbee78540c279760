pub mod coordinator;
pub mod record;
pub mod store;

pub use coordinator::{ExerciseCoordinator, ExerciseSource};
pub use record::{ActiveExercise, ExerciseId, ExerciseKey, ExerciseRecord, ExerciseStatus};
pub use store::{RecordConnection, RecordStore, SqliteStore};
