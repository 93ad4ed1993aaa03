//! Integration tests for trace loading, migration and snapshot rendering

mod cli_commands;
mod load_archive;
mod migration;
mod render_snapshots;
mod support;
