// Models module - Database entity representations

pub mod applicant;

pub use applicant::{Applicant, BloodGroup, MembershipStatus};
