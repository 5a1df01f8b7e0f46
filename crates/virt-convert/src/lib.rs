//! convert-machine-type - one-shot KubeVirt machine type conversion job
//!
//! The binary parses [`cli::Cli`], builds a client and hands the validated
//! [`virt_machine_type::JobConfig`] to [`runner::run`].

pub mod cli;
pub mod runner;
