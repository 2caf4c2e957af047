pub mod expense;
pub mod profile;
pub mod role;
pub mod salary_slip;
pub mod stats;
