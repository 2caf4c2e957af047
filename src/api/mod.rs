pub mod employee;
pub mod expense;
pub mod role;
pub mod salary_slip;
pub mod stats;
