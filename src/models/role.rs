use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::models::common::{math_utils, Cardinal, Contact, ContactKind};

/// 機体種別（ホストから与えられる唯一の自己情報）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum AgentClass {
    #[default]
    Primary,
    Secondary,
}

/// 起動時に一度だけ決定される役割
///
/// 編隊スロットと、味方と鉢合わせた時にどちらが待つかの決定にのみ使用します。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Role {
    NorthWing,
    Center,
    SouthWing,
    NorthScout,
    SouthScout,
}

impl Role {
    pub fn class(self) -> AgentClass {
        match self {
            Role::NorthWing | Role::Center | Role::SouthWing => AgentClass::Primary,
            Role::NorthScout | Role::SouthScout => AgentClass::Secondary,
        }
    }

    /// 編隊スロット（北 -1, 中央 0, 南 +1、偵察機は 0）
    pub fn slot(self) -> i32 {
        match self {
            Role::NorthWing => -1,
            Role::SouthWing => 1,
            Role::Center | Role::NorthScout | Role::SouthScout => 0,
        }
    }

    pub fn wire_name(self) -> &'static str {
        match self {
            Role::NorthWing => "NORTH_WING",
            Role::Center => "CENTER",
            Role::SouthWing => "SOUTH_WING",
            Role::NorthScout => "NORTH_SCOUT",
            Role::SouthScout => "SOUTH_SCOUT",
        }
    }

    /// 味方主機に前を塞がれた時、避けずに待つ側か
    pub fn waits_on_teammate(self) -> bool {
        !matches!(self, Role::NorthWing | Role::SouthWing)
    }

    /// 起動後に一度だけ走る探索の順序
    pub fn exploration_plan(self) -> &'static [Cardinal] {
        match self {
            Role::NorthScout => &[Cardinal::North, Cardinal::West, Cardinal::East],
            Role::SouthScout => &[Cardinal::South, Cardinal::West, Cardinal::East],
            Role::NorthWing | Role::Center | Role::SouthWing => &[],
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.wire_name())
    }
}

impl FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "NORTH_WING" => Ok(Role::NorthWing),
            "CENTER" => Ok(Role::Center),
            "SOUTH_WING" => Ok(Role::SouthWing),
            "NORTH_SCOUT" => Ok(Role::NorthScout),
            "SOUTH_SCOUT" => Ok(Role::SouthScout),
            _ => Err(format!("unknown role: {}", s)),
        }
    }
}

/// 起動時のレーダー観測から役割を推定
///
/// 事前に割り当てられたIDは存在しないため、同種の味方が真北・真南に
/// 見えるかどうかだけで自分の位置を決めます。
///
/// # 引数
///
/// * `class` - 自機の種別
/// * `radar` - 起動ティックのレーダー観測
/// * `eps` - 真北・真南とみなす角度誤差
///
/// # 戻り値
///
/// 推定された役割（以後変更されない）
pub fn infer_role(class: AgentClass, radar: &[Contact], eps: f64) -> Role {
    let sees = |kind: ContactKind, cardinal: Cardinal| {
        radar
            .iter()
            .any(|c| c.kind == kind && math_utils::is_same_direction(c.bearing, cardinal.heading(), eps))
    };

    match class {
        AgentClass::Primary => {
            let north = sees(ContactKind::TeamPrimary, Cardinal::North);
            let south = sees(ContactKind::TeamPrimary, Cardinal::South);
            match (north, south) {
                (true, false) => Role::SouthWing,
                (false, true) => Role::NorthWing,
                _ => Role::Center,
            }
        }
        AgentClass::Secondary => {
            if sees(ContactKind::TeamSecondary, Cardinal::North) {
                Role::SouthScout
            } else {
                Role::NorthScout
            }
        }
    }
}
