use crate::config::{AngleConfig, PerceptionConfig};
use crate::models::common::{math_utils, Contact, ContactKind};
use crate::models::pose::MotionCommand;

/// 1ティック分の知覚
///
/// レーダー観測と前方センサーから、閉塞・遮蔽などの述語を導出します。
/// 状態は持たず、ティックごとに作り直します。
#[derive(Debug, Clone, Copy)]
pub struct Perception<'a> {
    pub front: ContactKind,
    pub radar: &'a [Contact],
    pub heading: f64,
    angles: &'a AngleConfig,
    ranges: &'a PerceptionConfig,
    agent_radius: f64,
}

impl<'a> Perception<'a> {
    pub fn new(
        front: ContactKind,
        radar: &'a [Contact],
        heading: f64,
        angles: &'a AngleConfig,
        ranges: &'a PerceptionConfig,
        agent_radius: f64,
    ) -> Self {
        Self {
            front,
            radar,
            heading: math_utils::normalize_angle(heading),
            angles,
            ranges,
            agent_radius,
        }
    }

    pub fn wall_ahead(&self) -> bool {
        self.front == ContactKind::Wall
    }

    /// 前方センサーが何も捉えていない
    pub fn front_clear(&self) -> bool {
        self.front == ContactKind::Nothing
    }

    fn in_front(&self, bearing: f64) -> bool {
        math_utils::is_in_front_cone(bearing, self.heading, self.angles.front_half_width)
    }

    fn behind(&self, bearing: f64) -> bool {
        math_utils::is_behind_cone(bearing, self.heading, self.angles.rear_half_width)
    }

    /// 指定種別の物体が距離内にあるか
    ///
    /// # 引数
    ///
    /// * `kind` - 対象の種別
    /// * `max_range` - 判定距離（未満で閉塞）
    /// * `front_only` - 前方コーン内かつ後方コーン外に限定するか
    pub fn blocked_by(&self, kind: ContactKind, max_range: f64, front_only: bool) -> bool {
        self.radar.iter().any(|c| {
            c.kind == kind
                && c.range < max_range
                && (!front_only || (self.in_front(c.bearing) && !self.behind(c.bearing)))
        })
    }

    pub fn wreck_ahead(&self) -> bool {
        self.blocked_by(ContactKind::Wreck, self.ranges.wreck_range, true)
    }

    pub fn teammate_primary_ahead(&self) -> bool {
        self.blocked_by(ContactKind::TeamPrimary, self.ranges.teammate_primary_range, true)
    }

    /// 副機（敵味方とも）が前方にいる
    pub fn secondary_ahead(&self) -> bool {
        let range = self.ranges.secondary_range;
        self.blocked_by(ContactKind::TeamSecondary, range, true)
            || self.blocked_by(ContactKind::OpponentSecondary, range, true)
    }

    pub fn teammate_ahead(&self) -> bool {
        self.teammate_primary_ahead()
            || self.blocked_by(ContactKind::TeamSecondary, self.ranges.secondary_range, true)
    }

    pub fn opponent_ahead(&self) -> bool {
        let range = self.ranges.opponent_range;
        self.blocked_by(ContactKind::OpponentPrimary, range, true)
            || self.blocked_by(ContactKind::OpponentSecondary, range, true)
    }

    /// 敵が射程内に（遮蔽されずに）見えているか
    pub fn opponent_in_range(&self, range: f64) -> bool {
        self.radar.iter().any(|c| {
            c.kind.is_hostile() && c.range <= range && !self.line_of_sight_occluded(c.bearing, c.range)
        })
    }

    /// 前進を妨げるものがあるか
    pub fn obstacle_ahead(&self) -> bool {
        self.wall_ahead()
            || self.wreck_ahead()
            || self.teammate_ahead()
            || self.secondary_ahead()
            || self.opponent_ahead()
    }

    /// 味方主機だけが前方を塞いでいる
    pub fn blocked_by_teammate_only(&self) -> bool {
        self.teammate_primary_ahead()
            && !self.wall_ahead()
            && !self.wreck_ahead()
            && !self.secondary_ahead()
            && !self.opponent_ahead()
    }

    /// 副機だけが前方を塞いでいる
    pub fn blocked_by_secondary_only(&self) -> bool {
        self.secondary_ahead()
            && !self.wall_ahead()
            && !self.wreck_ahead()
            && !self.teammate_primary_ahead()
            && !self.opponent_ahead()
    }

    /// 前ティックの移動コマンドが今ティックの状況で阻まれたか
    ///
    /// 壁は前方センサーでしか見えないため、前進時のみ考慮します。
    pub fn motion_blocked(&self, command: MotionCommand) -> bool {
        let mobile = self.wreck_ahead() || self.teammate_ahead() || self.opponent_ahead();
        match command {
            MotionCommand::None => false,
            MotionCommand::Forward => mobile || self.wall_ahead(),
            MotionCommand::Backward => mobile,
        }
    }

    /// 目標への射線が残骸に遮られているか
    ///
    /// 目標より近い残骸の見かけの半角 `atan(agent_radius / range)` が
    /// 目標方位を覆っていれば遮蔽とみなします。
    pub fn line_of_sight_occluded(&self, target_bearing: f64, target_range: f64) -> bool {
        self.radar.iter().any(|wreck| {
            wreck.kind == ContactKind::Wreck
                && wreck.range < target_range
                && math_utils::angular_distance(wreck.bearing, target_bearing)
                    <= (self.agent_radius / wreck.range).atan()
        })
    }

    /// 指定方位の光線上、半径内に物体があるか
    pub fn radar_blocks_heading(&self, candidate: f64, radius: f64) -> bool {
        self.radar.iter().any(|c| {
            c.kind.is_obstacle()
                && c.range < radius
                && math_utils::is_same_direction(c.bearing, candidate, self.angles.radar_ray_eps)
        })
    }
}
