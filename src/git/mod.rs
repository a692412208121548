pub mod gateway;
pub mod history;
pub mod repository;

pub use gateway::{BranchLog, VcsGateway};
pub use repository::{set_network_timeout, Git2Gateway};
