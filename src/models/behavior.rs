//! 行動ステートマシン
//!
//! 毎ティック優先度順にルールを評価して「目標状態」を決め、その状態が望む動作を
//! 障害物処理（回避エンジン・味方への譲り合い）に通してから1つの動作を出します。
//!
//! 優先度（高い順）:
//!
//! 1. 自己保存: 被弾し撤退先が分かっていれば一定時間撤退（前方の敵には撃ち返す）
//! 2. 交戦: 遮蔽されていない敵が見えていれば攻撃
//! 3. 連携: 有効な共有目標があれば編隊位置へ収束
//! 4. 障害物処理: 前進が塞がれていれば回避
//! 5. 既定: 探索計画の残りを実行、なければ直進

use serde::Serialize;
use tracing::{debug, info};

use crate::config::AgentConfig;
use crate::models::avoidance::{AvoidAction, AvoidanceEngine};
use crate::models::common::{math_utils, Cardinal, Contact, Position2D, TurnDirection};
use crate::models::engagement::{Engagement, FirePlan};
use crate::models::perception::Perception;
use crate::models::pose::Pose;
use crate::models::protocol::Message;
use crate::models::role::{AgentClass, Role};

/// 1ティックに発行する唯一の動作
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub enum Action {
    Forward,
    Backward,
    Turn(TurnDirection),
    Fire { bearing: f64 },
    /// 何もしない（ブロードキャストのみのティックを含む）
    Hold,
}

impl From<AvoidAction> for Action {
    fn from(action: AvoidAction) -> Self {
        match action {
            AvoidAction::Turn(direction) => Action::Turn(direction),
            AvoidAction::Forward => Action::Forward,
            AvoidAction::Backward => Action::Backward,
        }
    }
}

/// 行動状態
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum BehaviorState {
    /// 起動直後の待機（レーダーが揃うまで）
    Stopped { remaining: u32 },
    Idle,
    /// 探索計画の `leg` 番目の方位へ走行中
    Exploring { leg: usize },
    Move,
    Avoiding,
    /// 味方に道を譲って待機中
    Yielding { waited: u32 },
    Converging,
    Attacking,
    Retreating { remaining: u32 },
}

impl BehaviorState {
    pub fn name(&self) -> &'static str {
        match self {
            BehaviorState::Stopped { .. } => "stopped",
            BehaviorState::Idle => "idle",
            BehaviorState::Exploring { .. } => "exploring",
            BehaviorState::Move => "move",
            BehaviorState::Avoiding => "avoiding",
            BehaviorState::Yielding { .. } => "yielding",
            BehaviorState::Converging => "converging",
            BehaviorState::Attacking => "attacking",
            BehaviorState::Retreating { .. } => "retreating",
        }
    }

    /// 移動を伴い、障害物処理の対象になる状態か
    pub fn is_mobile(&self) -> bool {
        matches!(
            self,
            BehaviorState::Exploring { .. }
                | BehaviorState::Move
                | BehaviorState::Converging
                | BehaviorState::Retreating { .. }
        )
    }
}

/// 1ティック分の判断結果
#[derive(Debug, Clone, PartialEq)]
pub struct Decision {
    pub state: BehaviorState,
    pub action: Action,
    pub broadcast: Option<Message>,
}

/// ステートマシンへの入力（知覚と信念から組み立てる）
#[derive(Debug, Clone, Copy)]
pub struct TickContext<'a> {
    pub perception: Perception<'a>,
    pub pose: Pose,
    /// 交戦可能な最良の敵
    pub hostile: Option<Contact>,
    /// 前ティックから耐久値が減ったか
    pub damaged: bool,
    pub rally_point: Option<Position2D>,
    /// 編隊補正済みの収束先
    pub target: Option<Position2D>,
    /// 壁走査の開始方位
    pub wall_escape: Option<f64>,
}

/// ステートマシンの出力
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Outcome {
    pub state: BehaviorState,
    pub action: Action,
    /// このティックで到達した探索方位の境界
    pub discovered: Option<Cardinal>,
}

/// 目標状態の選択（純粋関数）
///
/// # 引数
///
/// * `previous` - 前ティックの目標状態
/// * `ctx` - 今ティックの入力
/// * `pending_leg` - 未完了の探索レグ
/// * `config` - エージェント設定
///
/// # 戻り値
///
/// 今ティックの目標状態
pub fn select_goal(
    previous: BehaviorState,
    ctx: &TickContext<'_>,
    pending_leg: Option<usize>,
    config: &AgentConfig,
) -> BehaviorState {
    if let Some(rally) = ctx.rally_point {
        let away = ctx.pose.position().distance_to(&rally) >= config.coordination.arrival_precision;
        if ctx.damaged && away {
            return BehaviorState::Retreating {
                remaining: config.timing.retreat_ticks,
            };
        }
        if let BehaviorState::Retreating { remaining } = previous {
            if remaining > 1 && away {
                return BehaviorState::Retreating {
                    remaining: remaining - 1,
                };
            }
        }
    }

    if ctx.hostile.is_some() {
        return BehaviorState::Attacking;
    }

    if ctx.target.is_some() {
        return BehaviorState::Converging;
    }

    let roam = pending_leg.map_or(BehaviorState::Move, |leg| BehaviorState::Exploring { leg });
    match previous {
        BehaviorState::Stopped { remaining } if remaining > 1 => BehaviorState::Stopped {
            remaining: remaining - 1,
        },
        BehaviorState::Stopped { .. } => BehaviorState::Idle,
        BehaviorState::Exploring { leg } if pending_leg == Some(leg) => previous,
        _ => roam,
    }
}

fn steer(heading: f64, target: f64, eps: f64) -> Action {
    if math_utils::is_same_direction(heading, target, eps) {
        Action::Forward
    } else {
        Action::Turn(math_utils::turn_direction(heading, target))
    }
}

/// エージェント1体分の行動ステートマシン
#[derive(Debug, Clone)]
pub struct BehaviorMachine {
    role: Role,
    state: BehaviorState,
    goal: BehaviorState,
    next_leg: usize,
    avoidance: AvoidanceEngine,
    engagement: Engagement,
}

impl BehaviorMachine {
    pub fn new(role: Role, config: &AgentConfig) -> Self {
        let initial = BehaviorState::Stopped {
            remaining: config.timing.stop_cooldown,
        };
        Self {
            role,
            state: initial,
            goal: initial,
            next_leg: 0,
            avoidance: AvoidanceEngine::new(&config.avoidance, &config.angles),
            engagement: Engagement::new(),
        }
    }

    pub fn state(&self) -> BehaviorState {
        self.state
    }

    pub fn goal(&self) -> BehaviorState {
        self.goal
    }

    pub fn avoidance(&self) -> &AvoidanceEngine {
        &self.avoidance
    }

    pub fn pending_leg(&self) -> Option<usize> {
        (self.next_leg < self.role.exploration_plan().len()).then_some(self.next_leg)
    }

    fn can_fire(&self, config: &AgentConfig) -> bool {
        self.role.class() == AgentClass::Primary || config.engagement.secondary_fires
    }

    /// 1ティック分の判断
    pub fn act(&mut self, ctx: &TickContext<'_>, config: &AgentConfig) -> Outcome {
        let discovered = self.check_leg_completion(ctx, config);

        let goal = select_goal(self.goal, ctx, self.pending_leg(), config);
        if goal.name() != self.goal.name() {
            debug!(from = self.goal.name(), to = goal.name(), "goal changed");
        }
        if !goal.is_mobile() {
            self.avoidance.reset();
        }
        if !matches!(goal, BehaviorState::Attacking | BehaviorState::Retreating { .. }) {
            self.engagement.reset();
        }
        self.goal = goal;

        let (state, action) = self.resolve(goal, ctx, config);
        if state.name() != self.state.name() {
            debug!(from = self.state.name(), to = state.name(), ?action, "state transition");
        }
        self.state = state;

        Outcome {
            state,
            action,
            discovered,
        }
    }

    /// 探索中に目標方位の壁へ到達したら次のレグへ進める
    fn check_leg_completion(&mut self, ctx: &TickContext<'_>, config: &AgentConfig) -> Option<Cardinal> {
        let BehaviorState::Exploring { leg } = self.goal else {
            return None;
        };
        let cardinal = *self.role.exploration_plan().get(leg)?;
        let facing = math_utils::is_same_direction(
            ctx.perception.heading,
            cardinal.heading(),
            config.angles.coarse_eps,
        );
        if !(facing && ctx.perception.wall_ahead()) {
            return None;
        }
        self.next_leg = leg + 1;
        info!(side = %cardinal, leg, "exploration leg reached arena bound");
        Some(cardinal)
    }

    /// 目標状態の動作を障害物処理に通す
    fn resolve(
        &mut self,
        goal: BehaviorState,
        ctx: &TickContext<'_>,
        config: &AgentConfig,
    ) -> (BehaviorState, Action) {
        let perception = &ctx.perception;

        if goal.is_mobile() && self.avoidance.is_active() {
            if let Some(action) = self.avoidance.step(perception) {
                return (BehaviorState::Avoiding, action.into());
            }
        }

        let desired = self.goal_action(goal, ctx, config);
        if desired != Action::Forward || !goal.is_mobile() {
            return (goal, desired);
        }

        if perception.blocked_by_teammate_only() && self.role.waits_on_teammate() {
            let waited = match self.state {
                BehaviorState::Yielding { waited } => waited + 1,
                _ => 0,
            };
            if waited < config.timing.yield_wait_ticks {
                return (BehaviorState::Yielding { waited }, Action::Hold);
            }
        }

        let proximity = perception.front_clear()
            && perception.radar_blocks_heading(perception.heading, config.avoidance.proximity_radius);
        if perception.obstacle_ahead() || proximity {
            return match self.avoidance.begin(perception, ctx.wall_escape) {
                Some(action) => (BehaviorState::Avoiding, action.into()),
                None => (goal, Action::Hold),
            };
        }

        self.avoidance.note_clear();
        (goal, Action::Forward)
    }

    /// 目標状態が望む動作
    fn goal_action(&mut self, goal: BehaviorState, ctx: &TickContext<'_>, config: &AgentConfig) -> Action {
        let heading = ctx.perception.heading;
        let coarse = config.angles.coarse_eps;
        let here = ctx.pose.position();

        match goal {
            BehaviorState::Stopped { .. }
            | BehaviorState::Idle
            | BehaviorState::Avoiding
            | BehaviorState::Yielding { .. } => Action::Hold,
            BehaviorState::Move => Action::Forward,
            BehaviorState::Exploring { leg } => match self.role.exploration_plan().get(leg) {
                Some(cardinal) => steer(heading, cardinal.heading(), coarse),
                None => Action::Forward,
            },
            BehaviorState::Converging => match ctx.target {
                Some(target) => steer(heading, here.bearing_to(&target), coarse),
                None => Action::Forward,
            },
            BehaviorState::Retreating { .. } => {
                if let Some(bearing) = self.snap_shot(ctx, config) {
                    return Action::Fire { bearing };
                }
                match ctx.rally_point {
                    Some(rally) => steer(heading, here.bearing_to(&rally), coarse),
                    None => Action::Forward,
                }
            }
            BehaviorState::Attacking => {
                let Some(hostile) = ctx.hostile else {
                    return Action::Hold;
                };
                if !self.can_fire(config) {
                    // 撃たない機体は敵を正面に捉えて見張る
                    return match steer(heading, hostile.bearing, coarse) {
                        Action::Forward => Action::Hold,
                        turn => turn,
                    };
                }
                match self.engagement.plan(&hostile, ctx.perception.radar, &config.engagement) {
                    FirePlan::Fire { bearing } => Action::Fire { bearing },
                    FirePlan::Nudge { heading: nudge } => {
                        if !math_utils::is_same_direction(heading, nudge, config.angles.fine_eps) {
                            Action::Turn(math_utils::turn_direction(heading, nudge))
                        } else if ctx.perception.obstacle_ahead() {
                            self.engagement.note_blocked();
                            Action::Hold
                        } else {
                            Action::Forward
                        }
                    }
                }
            }
        }
    }

    /// 撤退中でも前方コーン内の敵には撃ち返す
    fn snap_shot(&mut self, ctx: &TickContext<'_>, config: &AgentConfig) -> Option<f64> {
        let hostile = ctx.hostile?;
        if !self.can_fire(config)
            || !math_utils::is_in_front_cone(
                hostile.bearing,
                ctx.perception.heading,
                config.engagement.snap_shot_cone,
            )
        {
            return None;
        }
        match self.engagement.plan(&hostile, ctx.perception.radar, &config.engagement) {
            FirePlan::Fire { bearing } => Some(bearing),
            FirePlan::Nudge { .. } => None,
        }
    }
}
