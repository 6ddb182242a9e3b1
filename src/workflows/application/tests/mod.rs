mod common;
mod gating;
mod submission;
