pub mod job_repo;
pub mod subtask_repo;

pub use job_repo::JobRepo;
pub use subtask_repo::SubTaskRepo;
