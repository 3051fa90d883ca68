// Services module - Business logic

pub mod approval;
pub mod credentials;
pub mod membership_id;
pub mod registration;
pub mod storage;
pub mod token;
