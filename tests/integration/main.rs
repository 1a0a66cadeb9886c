mod common;

mod announcement;
mod auth;
mod pg;
mod scoreboard;
