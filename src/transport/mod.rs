//! Front-ends over the sign-in session

pub mod cli;
