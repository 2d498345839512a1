mod cleanup_test;
mod common;
mod worker_test;
