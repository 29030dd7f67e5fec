pub mod admin;
pub mod editor;
pub mod student;

mod helper;
