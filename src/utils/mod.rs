pub mod grading;
pub mod jwt;
pub mod marks;
pub mod presentation;
