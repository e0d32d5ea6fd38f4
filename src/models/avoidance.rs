//! 障害物回避エンジン
//!
//! 前方が塞がれるたびに呼び出され、段階的に大きくなる旋回で空き方位を探します。
//! 数ティックに渡る動作は全てこのモジュールの内部フェーズとして保持し、
//! 上位のステートマシンは毎ティック `step` を呼ぶだけです。
//!
//! ## エスカレーション
//!
//! 1. 左右の混雑度を比べて旋回側を決める（同点なら交互に反転）
//! 2. 連続閉塞回数 × 小ステップだけ旋回する
//! 3. 閾値に達したら数ティック後退し、大きく転回する
//! 4. 壁の場合は壁と反対を向いてから一定角度ずつ全周を走査する
//! 5. 空き方位を見つけたら最低1ステップは前進してから再評価する

use std::f64::consts::{PI, TAU};

use tracing::debug;

use crate::config::{AngleConfig, AvoidanceConfig};
use crate::models::common::{math_utils, ContactKind, TurnDirection};
use crate::models::perception::Perception;

/// 回避エンジンが発行する動作
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AvoidAction {
    Turn(TurnDirection),
    Forward,
    Backward,
}

/// 回避動作のフェーズ
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum AvoidPhase {
    Idle,
    /// 目標方位まで旋回中
    Turning { target: f64, retries: u32 },
    /// 後退中（終了後に `then` へ旋回）
    BackingUp { remaining: u32, then: Option<f64> },
    /// 壁からの全周走査
    WallScan {
        target: f64,
        checks_left: u32,
        side: TurnDirection,
    },
    /// 空き方位へ前進中
    Commit { remaining: u32 },
}

#[derive(Debug, Clone)]
pub struct AvoidanceEngine {
    config: AvoidanceConfig,
    fine_eps: f64,
    rear_half_width: f64,
    consecutive_blocked: u32,
    preferred_side: TurnDirection,
    tie_breaks: u32,
    phase: AvoidPhase,
}

impl AvoidanceEngine {
    pub fn new(config: &AvoidanceConfig, angles: &AngleConfig) -> Self {
        Self {
            config: config.clone(),
            fine_eps: angles.fine_eps,
            rear_half_width: angles.rear_half_width,
            consecutive_blocked: 0,
            preferred_side: TurnDirection::Right,
            tie_breaks: 0,
            phase: AvoidPhase::Idle,
        }
    }

    pub fn phase(&self) -> AvoidPhase {
        self.phase
    }

    pub fn is_active(&self) -> bool {
        self.phase != AvoidPhase::Idle
    }

    pub fn consecutive_blocked(&self) -> u32 {
        self.consecutive_blocked
    }

    pub fn preferred_side(&self) -> TurnDirection {
        self.preferred_side
    }

    /// 進行中の動作を破棄（上位ルールによるキャンセル）
    pub fn reset(&mut self) {
        self.phase = AvoidPhase::Idle;
        self.consecutive_blocked = 0;
    }

    /// 回避なしで前進できたことを通知（連続閉塞回数をリセット）
    pub fn note_clear(&mut self) {
        if !self.is_active() {
            self.consecutive_blocked = 0;
        }
    }

    /// 前方閉塞を受けて新しい回避動作を開始
    ///
    /// # 引数
    ///
    /// * `perception` - 今ティックの知覚
    /// * `wall_escape` - 壁走査の開始方位（既知の境界付近ではアリーナ中心向き）
    ///
    /// # 戻り値
    ///
    /// このティックに発行する動作
    pub fn begin(&mut self, perception: &Perception<'_>, wall_escape: Option<f64>) -> Option<AvoidAction> {
        let heading = perception.heading;

        if perception.wall_ahead() {
            let start = math_utils::normalize_angle(wall_escape.unwrap_or(heading + PI));
            debug!(start, "wall ahead, starting wall scan");
            self.phase = AvoidPhase::WallScan {
                target: start,
                checks_left: self.sweep_stops(),
                side: self.preferred_side,
            };
            return self.kick(perception);
        }

        self.consecutive_blocked += 1;
        let side = self.choose_side(perception);
        self.preferred_side = side;

        if self.consecutive_blocked >= self.config.escalation_threshold {
            let then = math_utils::normalize_angle(heading + side.sign() * self.config.escape_turn);
            debug!(
                blocked = self.consecutive_blocked,
                ?side,
                "escalation threshold reached, backing away"
            );
            self.consecutive_blocked = 0;
            self.preferred_side = side.flipped();
            self.phase = AvoidPhase::BackingUp {
                remaining: self.config.escape_back_steps,
                then: Some(then),
            };
        } else {
            let step = self.config.small_step;
            let amount = (f64::from(self.consecutive_blocked) * step).min(TAU - step);
            let target = math_utils::normalize_angle(heading + side.sign() * amount);
            debug!(blocked = self.consecutive_blocked, ?side, target, "turning away");
            self.phase = AvoidPhase::Turning { target, retries: 0 };
        }
        self.kick(perception)
    }

    /// 進行中の回避動作を1ティック進める
    ///
    /// # 戻り値
    ///
    /// 発行する動作。回避が完了していれば None
    pub fn step(&mut self, perception: &Perception<'_>) -> Option<AvoidAction> {
        let heading = perception.heading;
        match self.phase {
            AvoidPhase::Idle => None,
            AvoidPhase::Turning { target, retries } => {
                if !self.aligned(heading, target) {
                    return Some(AvoidAction::Turn(math_utils::turn_direction(heading, target)));
                }
                if perception.obstacle_ahead() {
                    return self.begin(perception, None);
                }
                if retries < self.config.max_ray_retries
                    && perception.radar_blocks_heading(target, self.config.proximity_radius)
                {
                    let side = self.preferred_side;
                    self.phase = AvoidPhase::Turning {
                        target: math_utils::normalize_angle(target + side.sign() * self.config.small_step),
                        retries: retries + 1,
                    };
                    return Some(AvoidAction::Turn(side));
                }
                self.phase = AvoidPhase::Commit {
                    remaining: self.config.commit_steps,
                };
                self.step_commit(perception)
            }
            AvoidPhase::BackingUp { remaining, then } => {
                if remaining > 0 {
                    self.phase = AvoidPhase::BackingUp {
                        remaining: remaining - 1,
                        then,
                    };
                    return Some(AvoidAction::Backward);
                }
                match then {
                    Some(target) => {
                        self.phase = AvoidPhase::Turning { target, retries: 0 };
                        self.step(perception)
                    }
                    None => {
                        self.phase = AvoidPhase::Idle;
                        None
                    }
                }
            }
            AvoidPhase::WallScan {
                target,
                checks_left,
                side,
            } => {
                if !self.aligned(heading, target) {
                    return Some(AvoidAction::Turn(math_utils::turn_direction(heading, target)));
                }
                if perception.front_clear()
                    && !perception.obstacle_ahead()
                    && !perception.radar_blocks_heading(target, self.config.proximity_radius)
                {
                    self.phase = AvoidPhase::Commit {
                        remaining: self.config.commit_steps,
                    };
                    return self.step_commit(perception);
                }
                if checks_left > 0 {
                    self.phase = AvoidPhase::WallScan {
                        target: math_utils::normalize_angle(target + side.sign() * self.config.small_step),
                        checks_left: checks_left - 1,
                        side,
                    };
                    return Some(AvoidAction::Turn(side));
                }
                debug!("wall scan found no clear heading, backing away");
                self.phase = AvoidPhase::BackingUp {
                    remaining: self.config.wall_back_steps,
                    then: None,
                };
                self.step(perception)
            }
            AvoidPhase::Commit { .. } => self.step_commit(perception),
        }
    }

    fn step_commit(&mut self, perception: &Perception<'_>) -> Option<AvoidAction> {
        let AvoidPhase::Commit { remaining } = self.phase else {
            return self.step(perception);
        };
        if perception.obstacle_ahead() {
            return self.begin(perception, None);
        }
        let remaining = remaining.saturating_sub(1);
        self.phase = if remaining == 0 {
            AvoidPhase::Idle
        } else {
            AvoidPhase::Commit { remaining }
        };
        Some(AvoidAction::Forward)
    }

    /// 開始直後のフェーズの最初の動作（完了判定はしない）
    fn kick(&mut self, perception: &Perception<'_>) -> Option<AvoidAction> {
        match self.phase {
            AvoidPhase::Turning { target, .. } | AvoidPhase::WallScan { target, .. } => Some(
                AvoidAction::Turn(math_utils::turn_direction(perception.heading, target)),
            ),
            _ => self.step(perception),
        }
    }

    fn aligned(&self, heading: f64, target: f64) -> bool {
        math_utils::is_same_direction(heading, target, self.fine_eps)
    }

    /// 壁走査で開始方位の後に試す方位の数
    fn sweep_stops(&self) -> u32 {
        let stops = (TAU / self.config.small_step).round() as u32;
        stops.saturating_sub(1)
    }

    /// 旋回側の選択
    ///
    /// 走査半径内の物体を左右に振り分け（後方は除外、残骸は重み2）、
    /// 少ない側を選びます。同数なら最寄り物体が遠い側、それも同じなら右左を交互に選びます。
    fn choose_side(&mut self, perception: &Perception<'_>) -> TurnDirection {
        let heading = perception.heading;
        let (mut left, mut right) = (0u32, 0u32);
        let (mut nearest_left, mut nearest_right) = (f64::INFINITY, f64::INFINITY);

        for contact in perception.radar {
            if !contact.kind.is_obstacle() || contact.range > self.config.scan_radius {
                continue;
            }
            if math_utils::is_behind_cone(contact.bearing, heading, self.rear_half_width) {
                continue;
            }
            let weight = if contact.kind == ContactKind::Wreck { 2 } else { 1 };
            if math_utils::is_on_right(contact.bearing, heading) {
                right += weight;
                nearest_right = nearest_right.min(contact.range);
            } else {
                left += weight;
                nearest_left = nearest_left.min(contact.range);
            }
        }

        if left != right {
            return if left < right {
                TurnDirection::Left
            } else {
                TurnDirection::Right
            };
        }
        if nearest_left != nearest_right {
            return if nearest_left > nearest_right {
                TurnDirection::Left
            } else {
                TurnDirection::Right
            };
        }

        let side = if self.tie_breaks % 2 == 0 {
            TurnDirection::Right
        } else {
            TurnDirection::Left
        };
        self.tie_breaks = self.tie_breaks.wrapping_add(1);
        side
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PerceptionConfig;
    use crate::models::common::Contact;

    struct Fixture {
        angles: AngleConfig,
        ranges: PerceptionConfig,
        avoidance: AvoidanceConfig,
    }

    impl Fixture {
        fn new() -> Self {
            Self {
                angles: AngleConfig::default(),
                ranges: PerceptionConfig::default(),
                avoidance: AvoidanceConfig::default(),
            }
        }

        fn engine(&self) -> AvoidanceEngine {
            AvoidanceEngine::new(&self.avoidance, &self.angles)
        }

        fn perceive<'a>(&'a self, front: ContactKind, radar: &'a [Contact], heading: f64) -> Perception<'a> {
            Perception::new(front, radar, heading, &self.angles, &self.ranges, 50.0)
        }
    }

    #[test]
    fn test_turns_toward_less_crowded_side() {
        let fx = Fixture::new();
        let mut engine = fx.engine();
        let radar = [
            Contact::new(ContactKind::Wreck, 0.1, 90.0),
            Contact::new(ContactKind::TeamPrimary, 1.0, 200.0),
        ];
        let p = fx.perceive(ContactKind::Wreck, &radar, 0.0);
        assert_eq!(engine.begin(&p, None), Some(AvoidAction::Turn(TurnDirection::Left)));
        assert_eq!(engine.preferred_side(), TurnDirection::Left);
        assert_eq!(engine.consecutive_blocked(), 1);
    }

    #[test]
    fn test_tie_break_alternates() {
        let fx = Fixture::new();
        let mut engine = fx.engine();
        let p = fx.perceive(ContactKind::TeamPrimary, &[], 0.0);
        let first = engine.begin(&p, None);
        engine.reset();
        let second = engine.begin(&p, None);
        assert_ne!(first, second);
    }

    #[test]
    fn test_escalates_to_back_away_burst() {
        let fx = Fixture::new();
        let mut engine = fx.engine();
        let radar = [Contact::new(ContactKind::Wreck, 0.0, 60.0)];
        let p = fx.perceive(ContactKind::Wreck, &radar, 0.0);

        for _ in 0..(fx.avoidance.escalation_threshold - 1) {
            engine.begin(&p, None);
        }
        assert!(matches!(engine.phase(), AvoidPhase::Turning { .. }));
        assert_eq!(engine.begin(&p, None), Some(AvoidAction::Backward));
        assert_eq!(engine.consecutive_blocked(), 0);
        for _ in 1..fx.avoidance.escape_back_steps {
            assert_eq!(engine.step(&p), Some(AvoidAction::Backward));
        }
        // 後退後は大きく転回する
        assert!(matches!(engine.step(&p), Some(AvoidAction::Turn(_))));
        let AvoidPhase::Turning { target, .. } = engine.phase() else {
            panic!("expected turning phase");
        };
        assert!((math_utils::angular_distance(target, 0.0) - PI).abs() < 1e-9);
    }

    #[test]
    fn test_wall_scan_faces_away_then_sweeps() {
        let fx = Fixture::new();
        let mut engine = fx.engine();
        let p = fx.perceive(ContactKind::Wall, &[], 0.0);
        assert!(matches!(engine.begin(&p, None), Some(AvoidAction::Turn(_))));
        let AvoidPhase::WallScan { target, checks_left, .. } = engine.phase() else {
            panic!("expected wall scan");
        };
        assert!((target - PI).abs() < 1e-9);
        assert_eq!(checks_left, 11);
        // 壁は連続閉塞回数に数えない
        assert_eq!(engine.consecutive_blocked(), 0);

        // 反対を向いても塞がれていれば次の方位へ
        let p = fx.perceive(ContactKind::Wall, &[], PI);
        assert_eq!(engine.step(&p), Some(AvoidAction::Turn(engine.preferred_side())));

        let next = PI + engine.preferred_side().sign() * fx.avoidance.small_step;
        let p = fx.perceive(ContactKind::Nothing, &[], next);
        assert_eq!(engine.step(&p), Some(AvoidAction::Forward));
        assert!(!engine.is_active());
    }

    #[test]
    fn test_wall_scan_uses_escape_heading() {
        let fx = Fixture::new();
        let mut engine = fx.engine();
        let p = fx.perceive(ContactKind::Wall, &[], 0.0);
        engine.begin(&p, Some(PI / 2.0));
        let AvoidPhase::WallScan { target, .. } = engine.phase() else {
            panic!("expected wall scan");
        };
        assert!((target - PI / 2.0).abs() < 1e-9);
    }

    #[test]
    fn test_exhausted_wall_scan_backs_away() {
        let fx = Fixture::new();
        let mut engine = fx.engine();
        let mut heading = 0.0;
        let p = fx.perceive(ContactKind::Wall, &[], heading);
        engine.begin(&p, None);

        let mut backed = 0;
        for _ in 0..2000 {
            let p = fx.perceive(ContactKind::Wall, &[], heading);
            match engine.step(&p) {
                Some(AvoidAction::Turn(dir)) => heading = math_utils::normalize_angle(heading + dir.sign() * 0.04),
                Some(AvoidAction::Backward) => backed += 1,
                Some(AvoidAction::Forward) => panic!("walled in on every side"),
                None => break,
            }
        }
        assert_eq!(backed, fx.avoidance.wall_back_steps);
        assert!(!engine.is_active());
    }

    #[test]
    fn test_single_static_obstacle_resolves_within_ladder() {
        let fx = Fixture::new();
        let mut engine = fx.engine();
        let radar = [Contact::new(ContactKind::Wreck, 0.0, 80.0)];
        let mut heading: f64 = 0.0;
        let turn_rate = 0.04;

        let p = fx.perceive(ContactKind::Wreck, &radar, heading);
        let mut action = engine.begin(&p, None);
        let mut escalations = 1;
        let mut ticks = 0;

        while action != Some(AvoidAction::Forward) {
            ticks += 1;
            assert!(ticks < 1000, "avoidance did not terminate");
            if let Some(AvoidAction::Turn(dir)) = action {
                heading = math_utils::normalize_angle(heading + dir.sign() * turn_rate);
            }
            let p = fx.perceive(ContactKind::Nothing, &radar, heading);
            let before = engine.consecutive_blocked();
            action = engine.step(&p);
            if engine.consecutive_blocked() > before {
                escalations += 1;
            }
        }
        assert!(escalations <= 12);
        // 前進時には障害物は前方コーンの外にある
        let p = fx.perceive(ContactKind::Nothing, &radar, heading);
        assert!(!p.obstacle_ahead());
    }
}
