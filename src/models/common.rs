use std::f64::consts::{PI, TAU};
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// アリーナ平面上の2次元位置
///
/// 座標系はホストシミュレーションに合わせて y 軸下向き、方位 0 が東、
/// 右旋回で方位が増加します。
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Position2D {
    pub x: f64,
    pub y: f64,
}

impl Position2D {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    /// 2点間の距離
    pub fn distance_to(&self, other: &Position2D) -> f64 {
        (other.x - self.x).hypot(other.y - self.y)
    }

    /// 自位置から見た相手位置の絶対方位（[0, 2π)）
    pub fn bearing_to(&self, other: &Position2D) -> f64 {
        math_utils::normalize_angle((other.y - self.y).atan2(other.x - self.x))
    }

    /// 方位と距離から絶対座標を求める
    ///
    /// # 引数
    ///
    /// * `bearing` - 絶対方位（ラジアン）
    /// * `range` - 距離
    ///
    /// # 戻り値
    ///
    /// 自位置から `bearing` 方向へ `range` 進んだ位置
    pub fn offset(&self, bearing: f64, range: f64) -> Self {
        Self::new(self.x + range * bearing.cos(), self.y + range * bearing.sin())
    }
}

/// 旋回方向
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TurnDirection {
    Left,
    Right,
}

impl TurnDirection {
    /// 方位への符号（右旋回で方位が増える）
    pub fn sign(self) -> f64 {
        match self {
            TurnDirection::Left => -1.0,
            TurnDirection::Right => 1.0,
        }
    }

    pub fn flipped(self) -> Self {
        match self {
            TurnDirection::Left => TurnDirection::Right,
            TurnDirection::Right => TurnDirection::Left,
        }
    }
}

/// レーダー・前方センサーが報告する物体の種類
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ContactKind {
    Wall,
    Wreck,
    TeamPrimary,
    TeamSecondary,
    OpponentPrimary,
    OpponentSecondary,
    Projectile,
    Nothing,
}

impl ContactKind {
    pub fn is_hostile(self) -> bool {
        matches!(self, ContactKind::OpponentPrimary | ContactKind::OpponentSecondary)
    }

    pub fn is_teammate(self) -> bool {
        matches!(self, ContactKind::TeamPrimary | ContactKind::TeamSecondary)
    }

    /// 回避対象になる物体（壁は前方センサーでのみ扱う）
    pub fn is_obstacle(self) -> bool {
        matches!(
            self,
            ContactKind::Wreck
                | ContactKind::TeamPrimary
                | ContactKind::TeamSecondary
                | ContactKind::OpponentPrimary
                | ContactKind::OpponentSecondary
        )
    }
}

/// 1ティック分のレーダー観測
///
/// `bearing` は絶対方位、`range` は中心間距離です。ティックを跨いで保持されません。
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Contact {
    pub kind: ContactKind,
    pub bearing: f64,
    pub range: f64,
}

impl Contact {
    pub fn new(kind: ContactKind, bearing: f64, range: f64) -> Self {
        Self {
            kind,
            bearing: math_utils::normalize_angle(bearing),
            range: range.max(0.0),
        }
    }
}

/// 東西南北の基本方位
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Cardinal {
    North,
    South,
    East,
    West,
}

impl Cardinal {
    pub const ALL: [Cardinal; 4] = [Cardinal::North, Cardinal::South, Cardinal::East, Cardinal::West];

    /// 基本方位の絶対方位（y 軸下向きなので北は 3π/2）
    pub fn heading(self) -> f64 {
        match self {
            Cardinal::North => 3.0 * PI / 2.0,
            Cardinal::South => PI / 2.0,
            Cardinal::East => 0.0,
            Cardinal::West => PI,
        }
    }

    pub fn wire_name(self) -> &'static str {
        match self {
            Cardinal::North => "NORTH",
            Cardinal::South => "SOUTH",
            Cardinal::East => "EAST",
            Cardinal::West => "WEST",
        }
    }
}

impl fmt::Display for Cardinal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.wire_name())
    }
}

impl FromStr for Cardinal {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "NORTH" => Ok(Cardinal::North),
            "SOUTH" => Ok(Cardinal::South),
            "EAST" => Ok(Cardinal::East),
            "WEST" => Ok(Cardinal::West),
            _ => Err(format!("unknown cardinal: {}", s)),
        }
    }
}

/// 角度ユーティリティ関数
///
/// 全ての角度はラジアンで、比較の前に必ず [0, 2π) へ正規化します。
pub mod math_utils {
    use super::*;

    /// 角度を [0, 2π) に正規化
    ///
    /// 非有限値（NaN, ∞）は 0 として扱います。
    pub fn normalize_angle(angle: f64) -> f64 {
        if !angle.is_finite() {
            return 0.0;
        }
        let normalized = angle.rem_euclid(TAU);
        // 負の微小値で rem_euclid が TAU を返すことがある
        if normalized >= TAU { 0.0 } else { normalized }
    }

    /// 2方位間の最小角度差（[0, π]）
    pub fn angular_distance(a: f64, b: f64) -> f64 {
        let diff = normalize_angle(a - b);
        diff.min(TAU - diff)
    }

    /// 2方位が許容誤差内で同じ向きかどうか
    ///
    /// 0 と 2π の継ぎ目を跨ぐ場合も同じ向きとして扱います。
    pub fn is_same_direction(a: f64, b: f64, eps: f64) -> bool {
        angular_distance(a, b) < eps
    }

    /// 現在方位から目標方位への近い方の旋回方向（同角は右）
    pub fn turn_direction(current: f64, target: f64) -> TurnDirection {
        let diff = normalize_angle(target - current);
        if diff <= PI {
            TurnDirection::Right
        } else {
            TurnDirection::Left
        }
    }

    /// 方位が前方コーン内にあるか
    ///
    /// # 引数
    ///
    /// * `bearing` - 物体の絶対方位
    /// * `heading` - 自機の方位
    /// * `half_width` - コーンの半角
    pub fn is_in_front_cone(bearing: f64, heading: f64, half_width: f64) -> bool {
        angular_distance(bearing, heading) < half_width
    }

    /// 方位が後方コーン内にあるか
    pub fn is_behind_cone(bearing: f64, heading: f64, half_width: f64) -> bool {
        angular_distance(bearing, heading + PI) < half_width
    }

    /// 物体が自機の右半面にあるか（真正面は右として扱う）
    pub fn is_on_right(bearing: f64, heading: f64) -> bool {
        normalize_angle(bearing - heading) <= PI
    }
}

#[cfg(test)]
mod tests {
    use super::math_utils::*;
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_normalize_angle_basic() {
        assert_eq!(normalize_angle(0.0), 0.0);
        assert!((normalize_angle(-PI / 2.0) - 3.0 * PI / 2.0).abs() < 1e-12);
        assert!((normalize_angle(5.0 * PI) - PI).abs() < 1e-12);
        assert_eq!(normalize_angle(TAU), 0.0);
        assert_eq!(normalize_angle(f64::NAN), 0.0);
        assert_eq!(normalize_angle(-1e-18), 0.0);
    }

    #[test]
    fn test_same_direction_across_seam() {
        assert!(is_same_direction(0.02, TAU - 0.02, 0.1));
        assert!(!is_same_direction(0.0, 0.2, 0.1));
    }

    #[test]
    fn test_turn_direction_shortest() {
        assert_eq!(turn_direction(0.0, 0.5), TurnDirection::Right);
        assert_eq!(turn_direction(0.5, 0.0), TurnDirection::Left);
        assert_eq!(turn_direction(0.1, TAU - 0.1), TurnDirection::Left);
        // 真反対は右
        assert_eq!(turn_direction(0.0, PI), TurnDirection::Right);
        assert_eq!(turn_direction(1.0, 1.0), TurnDirection::Right);
    }

    #[test]
    fn test_cones() {
        let quarter = PI / 4.0;
        assert!(is_in_front_cone(0.3, 0.0, quarter));
        assert!(is_in_front_cone(TAU - 0.3, 0.0, quarter));
        assert!(!is_in_front_cone(PI / 2.0, 0.0, quarter));
        assert!(is_behind_cone(PI + 0.1, 0.0, quarter));
        assert!(!is_behind_cone(0.1, 0.0, quarter));
    }

    #[test]
    fn test_cardinal_round_trip() {
        for cardinal in Cardinal::ALL {
            assert_eq!(cardinal.wire_name().parse::<Cardinal>(), Ok(cardinal));
        }
        assert!("UP".parse::<Cardinal>().is_err());
    }

    #[test]
    fn test_position_offset_and_bearing() {
        let origin = Position2D::new(100.0, 100.0);
        let p = origin.offset(PI / 2.0, 50.0);
        assert!((p.x - 100.0).abs() < 1e-9);
        assert!((p.y - 150.0).abs() < 1e-9);
        assert!((origin.bearing_to(&p) - PI / 2.0).abs() < 1e-9);
        assert!((origin.distance_to(&p) - 50.0).abs() < 1e-9);
    }

    proptest! {
        #[test]
        fn normalize_is_closed(x in -1.0e6f64..1.0e6) {
            let n = normalize_angle(x);
            prop_assert!((0.0..TAU).contains(&n));
        }

        #[test]
        fn normalize_is_idempotent(x in -1.0e6f64..1.0e6) {
            let n = normalize_angle(x);
            prop_assert_eq!(normalize_angle(n), n);
        }
    }
}
