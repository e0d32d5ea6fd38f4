use tracing::trace;

use crate::models::common::{math_utils, Position2D};

/// 自己推定姿勢（推測航法）
///
/// 真値とは突き合わせないため、ホスト側の衝突処理次第でドリフトが蓄積します。
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Pose {
    pub x: f64,
    pub y: f64,
    /// 方位（ラジアン、[0, 2π)）
    pub heading: f64,
}

impl Pose {
    pub fn new(x: f64, y: f64, heading: f64) -> Self {
        Self {
            x,
            y,
            heading: math_utils::normalize_angle(heading),
        }
    }

    pub fn position(&self) -> Position2D {
        Position2D::new(self.x, self.y)
    }

    /// 自機相対の観測（絶対方位・距離）をワールド座標に変換
    pub fn project(&self, bearing: f64, range: f64) -> Position2D {
        self.position().offset(bearing, range)
    }
}

/// 前ティックに発行した移動コマンド
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MotionCommand {
    #[default]
    None,
    Forward,
    Backward,
}

/// 姿勢トラッカー
///
/// 前ティックの移動コマンドを、今ティックの閉塞判定で検証してから位置に反映します。
#[derive(Debug, Clone)]
pub struct PoseTracker {
    pose: Pose,
    /// 1ティックあたりの移動量
    speed: f64,
    pending: MotionCommand,
}

impl PoseTracker {
    pub fn new(origin: Position2D, heading: f64, speed: f64) -> Self {
        Self {
            pose: Pose::new(origin.x, origin.y, heading),
            speed,
            pending: MotionCommand::None,
        }
    }

    pub fn pose(&self) -> &Pose {
        &self.pose
    }

    pub fn pending(&self) -> MotionCommand {
        self.pending
    }

    /// 今ティック発行した移動コマンドを記録（次ティックに検証される）
    pub fn record_command(&mut self, command: MotionCommand) {
        self.pending = command;
    }

    /// 方位はホストの計器値をそのまま採用する
    pub fn sync_heading(&mut self, heading: f64) {
        self.pose.heading = math_utils::normalize_angle(heading);
    }

    /// 記録済みコマンドを検証して位置を更新
    ///
    /// # 引数
    ///
    /// * `was_blocked` - 今ティックの知覚で進行方向が塞がれていたか
    ///
    /// # 戻り値
    ///
    /// 位置が更新された場合はtrue
    pub fn commit_pending(&mut self, was_blocked: bool) -> bool {
        let command = std::mem::take(&mut self.pending);
        self.commit_motion(command, was_blocked)
    }

    /// 指定コマンドを検証して位置を更新
    ///
    /// `last_command` が `None` でなく、かつ閉塞していなかった場合のみ、
    /// 現在方位に沿って1ティック分（後退時は逆向き）進めます。
    pub fn commit_motion(&mut self, last_command: MotionCommand, was_blocked: bool) -> bool {
        let sign = match last_command {
            MotionCommand::None => return false,
            MotionCommand::Forward => 1.0,
            MotionCommand::Backward => -1.0,
        };
        if was_blocked {
            trace!(command = ?last_command, "motion refused, position unchanged");
            return false;
        }

        let step = self.speed * sign;
        self.pose.x += step * self.pose.heading.cos();
        self.pose.y += step * self.pose.heading.sin();
        true
    }
}
