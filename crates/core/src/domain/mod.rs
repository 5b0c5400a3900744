pub mod assignment;
pub mod award;
pub mod employee;
pub mod instance;
pub mod role;
pub mod workflow;
