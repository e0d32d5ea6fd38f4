//! # Agent モジュール
//!
//! 1体分のエージェント制御コアを提供します。
//!
//! ホストは起動時に [`Agent::activate`] を1回、以後ティックごとに [`Agent::step`] を
//! 同期的に呼び出します。コアはブロッキングI/Oもスレッドも持たず、複数ティックに
//! 渡る動作は全て状態として保持します。
//!
//! ## ティック内の処理順序
//!
//! 1. **移動の確定**: 前ティックの移動コマンドを今ティックの閉塞判定で検証
//! 2. **センサー読み取り**: レーダーと前方センサーから知覚を構成
//! 3. **受信処理**: 受信箱を全て取り出して信念（共有目標・境界）を更新
//! 4. **行動判断**: ステートマシンが優先度順にルールを評価
//! 5. **発行**: 動作を1つだけ発行し、必要ならブロードキャストを1つ添える
//!
//! `step` は失敗しません。不正なメッセージは破棄され、異常は安全な既定動作に落ちます。

use std::f64::consts::PI;

use tracing::{debug, debug_span, info, trace};

use crate::config::AgentConfig;
use crate::models::{
    find_best_hostile, formation_target, infer_role, Action, AgentClass, Belief, BehaviorMachine,
    BehaviorState, Cardinal, ContactKind, Decision, EnemyReport, Environment, Message,
    MotionCommand, Perception, Pose, PoseTracker, Position2D, Role, TargetSource, TickContext,
};

/// エージェント1体分の所有状態
#[derive(Debug, Clone)]
pub struct Agent {
    name: String,
    role: Role,
    config: AgentConfig,
    tracker: PoseTracker,
    belief: Belief,
    machine: BehaviorMachine,
    last_health: Option<f64>,
    tick: u64,
}

impl Agent {
    /// 起動処理
    ///
    /// 初回のレーダー観測から役割を推定し、役割ごとの初期位置を推測航法の
    /// 原点にします。役割は以後変更されません。
    ///
    /// # 引数
    ///
    /// * `env` - ホスト環境
    /// * `config` - エージェント設定
    pub fn activate<E: Environment + ?Sized>(env: &E, config: AgentConfig) -> Self {
        let radar = env.read_radar();
        let role = infer_role(config.class, &radar, config.angles.coarse_eps);
        let name = role.wire_name().to_string();
        let origin = config.spawns.origin_of(role);
        let tracker = PoseTracker::new(origin, env.read_heading(), config.motion.speed);

        info!(
            agent = %name,
            class = ?config.class,
            x = origin.x,
            y = origin.y,
            "role assigned"
        );

        Self {
            belief: Belief::new(config.coordination.teammate_expiry),
            machine: BehaviorMachine::new(role, &config),
            last_health: Some(env.read_health()),
            name,
            role,
            config,
            tracker,
            tick: 0,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn pose(&self) -> &Pose {
        self.tracker.pose()
    }

    pub fn belief(&self) -> &Belief {
        &self.belief
    }

    pub fn state(&self) -> BehaviorState {
        self.machine.state()
    }

    pub fn tick(&self) -> u64 {
        self.tick
    }

    pub fn config(&self) -> &AgentConfig {
        &self.config
    }

    /// 1ティック分の処理
    ///
    /// # 引数
    ///
    /// * `env` - ホスト環境
    ///
    /// # 戻り値
    ///
    /// このティックの状態・発行した動作・ブロードキャスト
    pub fn step<E: Environment + ?Sized>(&mut self, env: &mut E) -> Decision {
        self.tick += 1;
        let _span = debug_span!("tick", agent = %self.name, tick = self.tick).entered();

        let heading = env.read_heading();
        self.tracker.sync_heading(heading);
        let radar = env.read_radar();
        let front = env.read_forward_sensor();
        let health = env.read_health();

        let perception = Perception::new(
            front,
            &radar,
            heading,
            &self.config.angles,
            &self.config.perception,
            self.config.motion.agent_radius,
        );
        self.tracker
            .commit_pending(perception.motion_blocked(self.tracker.pending()));
        let pose = *self.tracker.pose();

        self.belief.advance();
        for text in env.drain_inbox() {
            match Message::decode(&text) {
                Ok(message) => apply_message(
                    &mut self.belief,
                    message,
                    &self.name,
                    self.config.coordination.report_expiry,
                ),
                Err(error) => debug!(%error, message = %text, "discarding malformed message"),
            }
        }

        let tolerance = self.config.coordination.wreck_tolerance;
        for wreck in radar.iter().filter(|c| c.kind == ContactKind::Wreck) {
            let at = pose.project(wreck.bearing, wreck.range);
            if self.belief.wrecks.remember(at, tolerance) {
                trace!(x = at.x, y = at.y, "wreck remembered");
            }
        }
        if self.belief.drop_target_on_wreck(tolerance) {
            debug!("shared target lies on a remembered wreck, dropped");
        }

        let hostile = find_best_hostile(&perception, self.config.engagement.hostile_range);
        if let Some(contact) = hostile {
            self.belief.set_target(
                pose.project(contact.bearing, contact.range),
                self.config.coordination.sighting_grace,
                TargetSource::OwnSighting,
            );
        }

        let mut target = self.belief.target.as_ref().map(|t| match &t.source {
            TargetSource::OwnSighting => t.position,
            TargetSource::Teammate(spotter) => formation_target(
                t.position,
                pose.position(),
                self.role.slot(),
                spotter_slot(spotter),
                &self.config.coordination,
            ),
        });
        if hostile.is_none() {
            if let Some(goal) = target {
                if pose.position().distance_to(&goal) < self.config.coordination.arrival_precision {
                    debug!(x = goal.x, y = goal.y, "arrived at shared target");
                    self.belief.clear_target();
                    target = None;
                }
            }
        }

        let damaged = self.last_health.is_some_and(|last| health < last);
        self.last_health = Some(health);
        if damaged {
            info!(health, "took damage");
        }
        let rally_point = self
            .belief
            .latest_teammate()
            .unwrap_or_else(|| self.config.default_rally_point());

        let ctx = TickContext {
            perception,
            pose,
            hostile,
            damaged,
            rally_point: Some(rally_point),
            target,
            wall_escape: self.wall_escape(&pose),
        };
        let outcome = self.machine.act(&ctx, &self.config);

        let mut broadcast = None;
        if let Some(side) = outcome.discovered {
            let coordinate = border_coordinate(side, pose.position(), self.config.motion.front_sensor_range);
            if self.belief.bounds.record(side, coordinate) {
                info!(side = %side, coordinate, "arena bound discovered");
                broadcast = Some(Message::Border {
                    side,
                    coordinate: coordinate as i64,
                });
            }
        }
        if broadcast.is_none() {
            if let Some(contact) = hostile {
                let report = EnemyReport::new(
                    self.name.clone(),
                    pose.position(),
                    pose.project(contact.bearing, contact.range),
                );
                broadcast = match (self.role.class(), outcome.action) {
                    (AgentClass::Secondary, _) => Some(Message::ScoutEnemyLocation(report)),
                    (AgentClass::Primary, Action::Fire { .. }) => Some(Message::EnemyLocation(report)),
                    _ => None,
                };
            }
        }

        let motion = match outcome.action {
            Action::Forward => {
                env.command_forward();
                MotionCommand::Forward
            }
            Action::Backward => {
                env.command_backward();
                MotionCommand::Backward
            }
            Action::Turn(direction) => {
                env.command_turn(direction);
                MotionCommand::None
            }
            Action::Fire { bearing } => {
                env.command_fire(bearing);
                info!(bearing, "firing");
                MotionCommand::None
            }
            Action::Hold => MotionCommand::None,
        };
        self.tracker.record_command(motion);

        if let Some(message) = &broadcast {
            env.broadcast(&message.encode());
        }

        trace!(state = outcome.state.name(), action = ?outcome.action, "tick complete");
        Decision {
            state: outcome.state,
            action: outcome.action,
            broadcast,
        }
    }

    /// 既知の境界付近にいる場合、壁走査をアリーナ中心向きから始める
    fn wall_escape(&self, pose: &Pose) -> Option<f64> {
        let margin = self.config.coordination.border_margin;
        let here = pose.position();
        let side = self.belief.bounds.near_border(here, margin)?;
        let away = here.offset(side.heading() + PI, margin);
        Some(here.bearing_to(&self.belief.bounds.center_or(away)))
    }
}

/// デコード済みメッセージを信念に反映
fn apply_message(belief: &mut Belief, message: Message, me: &str, report_expiry: u32) {
    match message {
        Message::EnemyLocation(report) | Message::ScoutEnemyLocation(report) => {
            if report.spotter == me {
                return;
            }
            belief.note_teammate(&report.spotter, report.spotter_position());
            belief.set_target(
                report.enemy_position(),
                report_expiry,
                TargetSource::Teammate(report.spotter),
            );
        }
        Message::Border { side, coordinate } => {
            if belief.bounds.record(side, coordinate as f64) {
                debug!(side = %side, coordinate, "arena bound received");
            }
        }
    }
}

fn spotter_slot(spotter: &str) -> i32 {
    spotter.parse::<Role>().map_or(0, Role::slot)
}

/// 前方センサーが壁を捉えた位置から境界座標を求める
fn border_coordinate(side: Cardinal, here: Position2D, sensor_range: f64) -> f64 {
    match side {
        Cardinal::North => here.y - sensor_range,
        Cardinal::South => here.y + sensor_range,
        Cardinal::East => here.x + sensor_range,
        Cardinal::West => here.x - sensor_range,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Contact, TurnDirection};

    /// 固定のセンサー値を返すだけの環境
    #[derive(Default)]
    struct StubEnv {
        radar: Vec<Contact>,
        front: Option<ContactKind>,
        heading: f64,
        health: f64,
        inbox: Vec<String>,
        commands: Vec<Action>,
        sent: Vec<String>,
    }

    impl Environment for StubEnv {
        fn read_radar(&self) -> Vec<Contact> {
            self.radar.clone()
        }
        fn read_forward_sensor(&self) -> ContactKind {
            self.front.unwrap_or(ContactKind::Nothing)
        }
        fn read_heading(&self) -> f64 {
            self.heading
        }
        fn read_health(&self) -> f64 {
            self.health
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
            self.sent.push(text.to_string());
        }
        fn drain_inbox(&mut self) -> Vec<String> {
            std::mem::take(&mut self.inbox)
        }
    }

    fn ready_config() -> AgentConfig {
        let mut config = AgentConfig::default();
        config.timing.stop_cooldown = 0;
        config
    }

    #[test]
    fn test_activation_sets_role_and_origin() {
        let env = StubEnv {
            radar: vec![Contact::new(ContactKind::TeamPrimary, Cardinal::South.heading(), 200.0)],
            health: 100.0,
            ..StubEnv::default()
        };
        let agent = Agent::activate(&env, AgentConfig::default());
        assert_eq!(agent.role(), Role::NorthWing);
        assert_eq!(agent.name(), "NORTH_WING");
        assert_eq!(agent.pose().position(), Position2D::new(200.0, 800.0));
    }

    #[test]
    fn test_odometry_credits_only_unblocked_forward() {
        let mut env = StubEnv {
            health: 100.0,
            ..StubEnv::default()
        };
        let mut agent = Agent::activate(&env, ready_config());
        agent.step(&mut env); // Stopped -> Idle
        assert_eq!(agent.step(&mut env).action, Action::Forward);
        agent.step(&mut env);
        assert!((agent.pose().x - 203.0).abs() < 1e-9);

        // 前ティックの前進が壁に阻まれたら位置は変わらない
        env.front = Some(ContactKind::Wall);
        agent.step(&mut env);
        assert!((agent.pose().x - 203.0).abs() < 1e-9);
    }

    #[test]
    fn test_fire_broadcasts_enemy_location() {
        let mut env = StubEnv {
            health: 100.0,
            ..StubEnv::default()
        };
        let mut agent = Agent::activate(&env, ready_config());
        env.radar = vec![Contact::new(ContactKind::OpponentPrimary, 0.0, 300.0)];
        let decision = agent.step(&mut env);
        assert_eq!(decision.action, Action::Fire { bearing: 0.0 });
        assert_eq!(
            decision.broadcast.map(|m| m.encode()),
            Some("ENEMY_LOCATION|CENTER|200|1000|500|1000".to_string())
        );
        assert_eq!(env.sent.len(), 1);
    }

    #[test]
    fn test_own_reports_are_ignored() {
        let mut env = StubEnv {
            health: 100.0,
            inbox: vec!["ENEMY_LOCATION|CENTER|0|0|900|900".to_string()],
            ..StubEnv::default()
        };
        let mut agent = Agent::activate(&env, ready_config());
        agent.step(&mut env);
        assert!(agent.belief().target.is_none());
    }

    #[test]
    fn test_teammate_report_sets_target_and_rally_point() {
        let mut env = StubEnv {
            health: 100.0,
            inbox: vec!["ENEMY_LOCATION|SOUTH_WING|200|1200|900|1000".to_string()],
            ..StubEnv::default()
        };
        let mut agent = Agent::activate(&env, ready_config());
        let decision = agent.step(&mut env);
        assert_eq!(decision.state, BehaviorState::Converging);
        assert_eq!(agent.belief().target_position(), Some(Position2D::new(900.0, 1000.0)));
        assert_eq!(agent.belief().latest_teammate(), Some(Position2D::new(200.0, 1200.0)));
    }

    #[test]
    fn test_damage_triggers_retreat() {
        let mut env = StubEnv {
            health: 100.0,
            heading: 0.0,
            ..StubEnv::default()
        };
        let mut config = ready_config();
        config.rally_point = Some(Position2D::new(0.0, 0.0));
        let mut agent = Agent::activate(&env, config);
        env.health = 90.0;
        let decision = agent.step(&mut env);
        assert!(matches!(decision.state, BehaviorState::Retreating { .. }));
    }
}
