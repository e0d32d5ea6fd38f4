//! # arenabot
//!
//! 2D アリーナで戦う自律エージェントの制御コア。
//!
//! ホストが毎ティック [`agent::Agent::step`] を呼び出し、エージェントはセンサーを読んで
//! 1つのコマンドを発行します。チームメイトとはテキストメッセージで目標を共有します。

pub mod agent;
pub mod config;
pub mod logging;
pub mod models;
pub mod replay;
pub mod tape;
