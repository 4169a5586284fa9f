pub(crate) mod common;

mod admin;
mod decisions;
