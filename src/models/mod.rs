// src/models/mod.rs

pub mod assignment;
pub mod attempt;
pub mod exam;
pub mod question;
pub mod report_card;
