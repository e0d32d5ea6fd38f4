// 基本的なデータ型と角度ユーティリティ
pub mod common;

// ホスト環境のインターフェース（trait）定義
pub mod traits;

// エージェント制御コアの各コンポーネント
pub mod pose;
pub mod perception;
pub mod avoidance;
pub mod engagement;
pub mod protocol;
pub mod belief;
pub mod role;
pub mod behavior;

// 便利な re-export
pub use common::*;
pub use traits::*;
pub use pose::{MotionCommand, Pose, PoseTracker};
pub use perception::Perception;
pub use avoidance::{AvoidAction, AvoidPhase, AvoidanceEngine};
pub use engagement::{find_best_hostile, teammate_in_line, Engagement, FirePlan};
pub use protocol::{formation_target, DecodeError, EnemyReport, Message};
pub use belief::{ArenaBounds, Belief, SharedTarget, TargetSource, TeammateSighting, WreckMemory};
pub use role::{infer_role, AgentClass, Role};
pub use behavior::{select_goal, Action, BehaviorMachine, BehaviorState, Decision, Outcome, TickContext};
