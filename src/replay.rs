//! # Replay モジュール
//!
//! 記録済みのセンサーテープでエージェント制御コアを駆動する再生エンジンを提供します。
//!
//! ホストシミュレーションは範囲外のため、テープの各フレームを1ティックとして
//! `Environment` を実装し、コアが発行したコマンドとブロードキャストを記録します。
//! 移動コマンドはテープに影響しません（センサー値は記録どおりに再生されます）。
//!
//! ## 使用例
//!
//! ```no_run
//! use arenabot::config::AgentConfig;
//! use arenabot::replay::ReplayEngine;
//! use arenabot::tape::Tape;
//!
//! let tape = Tape::from_file("tapes/corridor.yaml")?;
//! let mut engine = ReplayEngine::new(tape, AgentConfig::default(), 1);
//! engine.initialize()?;
//! let summary = engine.run()?;
//! summary.print();
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

use tracing::{debug, info, trace};

use crate::agent::Agent;
use crate::config::AgentConfig;
use crate::models::{Action, BehaviorState, Contact, ContactKind, Environment, Role, TurnDirection};
use crate::tape::{Frame, Tape, TapeError};

/// テープを再生する環境
#[derive(Debug, Clone)]
pub struct ReplayEnvironment {
    frames: Vec<Frame>,
    cursor: usize,
    commands: Vec<Action>,
    broadcasts: Vec<String>,
}

impl ReplayEnvironment {
    pub fn new(frames: Vec<Frame>) -> Self {
        Self {
            frames,
            cursor: 0,
            commands: Vec::new(),
            broadcasts: Vec::new(),
        }
    }

    pub fn cursor(&self) -> usize {
        self.cursor
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    /// 次のフレームへ進む
    ///
    /// # 戻り値
    ///
    /// まだフレームが残っていればtrue
    pub fn advance(&mut self) -> bool {
        if self.cursor < self.frames.len() {
            self.cursor += 1;
        }
        self.cursor < self.frames.len()
    }

    pub fn commands(&self) -> &[Action] {
        &self.commands
    }

    pub fn broadcasts(&self) -> &[String] {
        &self.broadcasts
    }

    fn frame(&self) -> Option<&Frame> {
        self.frames.get(self.cursor)
    }
}

impl Environment for ReplayEnvironment {
    fn read_radar(&self) -> Vec<Contact> {
        self.frame()
            .map(|f| {
                f.radar
                    .iter()
                    .map(|c| Contact::new(c.kind, c.bearing, c.range))
                    .collect()
            })
            .unwrap_or_default()
    }

    fn read_forward_sensor(&self) -> ContactKind {
        self.frame().map_or(ContactKind::Nothing, |f| f.front)
    }

    fn read_heading(&self) -> f64 {
        self.frame().map_or(0.0, |f| f.heading)
    }

    fn read_health(&self) -> f64 {
        self.frame().map_or(0.0, |f| f.health)
    }

    fn command_forward(&mut self) {
        self.commands.push(Action::Forward);
    }

    fn command_backward(&mut self) {
        self.commands.push(Action::Backward);
    }

    fn command_turn(&mut self, direction: TurnDirection) {
        self.commands.push(Action::Turn(direction));
    }

    fn command_fire(&mut self, bearing: f64) {
        self.commands.push(Action::Fire { bearing });
    }

    fn broadcast(&mut self, text: &str) {
        self.broadcasts.push(text.to_string());
    }

    fn drain_inbox(&mut self) -> Vec<String> {
        match self.frames.get_mut(self.cursor) {
            Some(frame) => std::mem::take(&mut frame.inbox),
            None => Vec::new(),
        }
    }
}

/// 再生結果の集計
#[derive(Debug, Clone, PartialEq)]
pub struct ReplaySummary {
    pub role: Role,
    pub ticks: u64,
    pub forwards: u32,
    pub backwards: u32,
    pub turns: u32,
    pub fires: u32,
    pub holds: u32,
    pub broadcasts: usize,
    pub final_state: BehaviorState,
}

impl ReplaySummary {
    pub fn print(&self) {
        println!("=== 再生結果 ===");
        println!("役割: {}", self.role);
        println!("ティック数: {}", self.ticks);
        println!(
            "動作: 前進 {} / 後退 {} / 旋回 {} / 射撃 {} / 待機 {}",
            self.forwards, self.backwards, self.turns, self.fires, self.holds
        );
        println!("送信メッセージ: {}件", self.broadcasts);
        println!("最終状態: {}", self.final_state.name());
    }
}

pub struct ReplayEngine {
    pub env: ReplayEnvironment,
    pub agent: Option<Agent>,
    pub config: AgentConfig,
    pub tape_name: String,
    pub verbose_level: u8,
}

impl ReplayEngine {
    /// テープの機体種別で設定を上書きして再生エンジンを作成
    pub fn new(tape: Tape, mut config: AgentConfig, verbose_level: u8) -> Self {
        config.class = tape.agent.class;
        Self {
            env: ReplayEnvironment::new(tape.frames),
            agent: None,
            config,
            tape_name: tape.meta.name,
            verbose_level,
        }
    }

    /// 先頭フレームでエージェントを起動
    pub fn initialize(&mut self) -> Result<(), TapeError> {
        if self.env.is_empty() {
            return Err(TapeError::Empty);
        }

        let agent = Agent::activate(&self.env, self.config.clone());
        if self.verbose_level > 0 {
            info!("再生エンジンを初期化: {} ({}フレーム)", self.tape_name, self.env.len());
            info!("  役割: {}", agent.role());
        }
        self.agent = Some(agent);
        Ok(())
    }

    /// 全フレームを再生
    pub fn run(&mut self) -> Result<ReplaySummary, TapeError> {
        if self.agent.is_none() {
            self.initialize()?;
        }
        let Some(agent) = self.agent.as_mut() else {
            return Err(TapeError::Empty);
        };

        info!("=== 再生開始 ===");
        let mut summary = ReplaySummary {
            role: agent.role(),
            ticks: 0,
            forwards: 0,
            backwards: 0,
            turns: 0,
            fires: 0,
            holds: 0,
            broadcasts: 0,
            final_state: agent.state(),
        };

        loop {
            let decision = agent.step(&mut self.env);
            match decision.action {
                Action::Forward => summary.forwards += 1,
                Action::Backward => summary.backwards += 1,
                Action::Turn(_) => summary.turns += 1,
                Action::Fire { .. } => summary.fires += 1,
                Action::Hold => summary.holds += 1,
            }
            if let Some(message) = &decision.broadcast {
                debug!(tick = agent.tick(), message = %message, "broadcast");
            }
            summary.ticks = agent.tick();
            summary.final_state = decision.state;

            if self.verbose_level > 2 {
                trace!(
                    "ティック {}: {} {:?}",
                    agent.tick(),
                    decision.state.name(),
                    decision.action
                );
            }
            if summary.ticks % 100 == 0 && self.verbose_level > 0 {
                let progress = (self.env.cursor() + 1) as f64 / self.env.len() as f64 * 100.0;
                info!("進行状況: {:.1}% ({}/{}フレーム)", progress, self.env.cursor() + 1, self.env.len());
            }

            if !self.env.advance() {
                break;
            }
        }
        summary.broadcasts = self.env.broadcasts().len();

        info!("=== 再生完了 ===");
        info!("総ティック数: {}", summary.ticks);
        Ok(summary)
    }
}
