// src/services/mod.rs

pub mod grading;
pub mod queries;
pub mod report_card;
pub mod responses;
