pub mod job;
pub mod subtask;

pub use job::{JobItemRow, JobRow};
pub use subtask::SubTaskRow;
