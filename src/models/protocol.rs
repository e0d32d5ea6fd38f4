//! チーム間ブロードキャストのコーデック
//!
//! ワイヤ形式はパイプ区切りのテキストで、ホスト側の配送に合わせて変更しません。
//!
//! ```text
//! ENEMY_LOCATION|<spotter>|<spotterX>|<spotterY>|<enemyX>|<enemyY>
//! SCOUT_ENEMY_LOCATION|<spotter>|<spotterX>|<spotterY>|<enemyX>|<enemyY>
//! BORDER|<NORTH|SOUTH|EAST|WEST>|<coordinate>
//! ```
//!
//! 座標は送信時に整数へ切り捨てます。受信側のデコードは防御的で、
//! 不正なメッセージは `DecodeError` として返され、呼び出し側で破棄されます。

use std::f64::consts::PI;
use std::fmt;
use std::str::FromStr;

use thiserror::Error;

use crate::config::{CoordinationConfig, FormationStyle};
use crate::models::common::{Cardinal, Position2D};

const ENEMY_LOCATION: &str = "ENEMY_LOCATION";
const SCOUT_ENEMY_LOCATION: &str = "SCOUT_ENEMY_LOCATION";
const BORDER: &str = "BORDER";

/// 敵位置の報告
#[derive(Debug, Clone, PartialEq)]
pub struct EnemyReport {
    pub spotter: String,
    pub spotter_x: f64,
    pub spotter_y: f64,
    pub enemy_x: f64,
    pub enemy_y: f64,
}

impl EnemyReport {
    pub fn new(spotter: impl Into<String>, spotter_at: Position2D, enemy_at: Position2D) -> Self {
        Self {
            spotter: spotter.into(),
            spotter_x: spotter_at.x,
            spotter_y: spotter_at.y,
            enemy_x: enemy_at.x,
            enemy_y: enemy_at.y,
        }
    }

    pub fn spotter_position(&self) -> Position2D {
        Position2D::new(self.spotter_x, self.spotter_y)
    }

    pub fn enemy_position(&self) -> Position2D {
        Position2D::new(self.enemy_x, self.enemy_y)
    }
}

/// ブロードキャストメッセージ
#[derive(Debug, Clone, PartialEq)]
pub enum Message {
    EnemyLocation(EnemyReport),
    ScoutEnemyLocation(EnemyReport),
    Border { side: Cardinal, coordinate: i64 },
}

/// デコード失敗の理由
#[derive(Debug, Clone, PartialEq, Error)]
pub enum DecodeError {
    #[error("empty message")]
    Empty,

    #[error("unknown message tag: {0}")]
    UnknownTag(String),

    #[error("{tag}: expected {expected} fields, found {found}")]
    FieldCount {
        tag: &'static str,
        expected: usize,
        found: usize,
    },

    #[error("field {field} is not a number: {value:?}")]
    BadNumber { field: &'static str, value: String },

    #[error("unknown border side: {0}")]
    UnknownSide(String),

    #[error("empty spotter name")]
    EmptySpotter,
}

impl Message {
    /// 敵位置報告があれば返す
    pub fn report(&self) -> Option<&EnemyReport> {
        match self {
            Message::EnemyLocation(report) | Message::ScoutEnemyLocation(report) => Some(report),
            Message::Border { .. } => None,
        }
    }

    pub fn encode(&self) -> String {
        self.to_string()
    }

    /// ワイヤ形式の文字列をデコード
    ///
    /// # 引数
    ///
    /// * `text` - 受信したテキスト
    ///
    /// # 戻り値
    ///
    /// デコードしたメッセージ、形式が不正な場合は `DecodeError`
    pub fn decode(text: &str) -> Result<Self, DecodeError> {
        let text = text.trim();
        if text.is_empty() {
            return Err(DecodeError::Empty);
        }

        let fields: Vec<&str> = text.split('|').collect();
        match fields[0] {
            ENEMY_LOCATION => decode_report(ENEMY_LOCATION, &fields).map(Message::EnemyLocation),
            SCOUT_ENEMY_LOCATION => {
                decode_report(SCOUT_ENEMY_LOCATION, &fields).map(Message::ScoutEnemyLocation)
            }
            BORDER => {
                expect_fields(BORDER, &fields, 3)?;
                let side = Cardinal::from_str(fields[1])
                    .map_err(|_| DecodeError::UnknownSide(fields[1].to_string()))?;
                let coordinate = fields[2].trim().parse::<i64>().map_err(|_| DecodeError::BadNumber {
                    field: "coordinate",
                    value: fields[2].to_string(),
                })?;
                Ok(Message::Border { side, coordinate })
            }
            other => Err(DecodeError::UnknownTag(other.to_string())),
        }
    }
}

impl fmt::Display for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let (tag, report) = match self {
            Message::EnemyLocation(report) => (ENEMY_LOCATION, report),
            Message::ScoutEnemyLocation(report) => (SCOUT_ENEMY_LOCATION, report),
            Message::Border { side, coordinate } => {
                return write!(f, "{}|{}|{}", BORDER, side, coordinate);
            }
        };
        write!(
            f,
            "{}|{}|{}|{}|{}|{}",
            tag,
            report.spotter,
            report.spotter_x as i64,
            report.spotter_y as i64,
            report.enemy_x as i64,
            report.enemy_y as i64
        )
    }
}

fn expect_fields(tag: &'static str, fields: &[&str], expected: usize) -> Result<(), DecodeError> {
    if fields.len() != expected {
        return Err(DecodeError::FieldCount {
            tag,
            expected,
            found: fields.len(),
        });
    }
    Ok(())
}

fn parse_coordinate(field: &'static str, value: &str) -> Result<f64, DecodeError> {
    match value.trim().parse::<f64>() {
        Ok(v) if v.is_finite() => Ok(v),
        _ => Err(DecodeError::BadNumber {
            field,
            value: value.to_string(),
        }),
    }
}

fn decode_report(tag: &'static str, fields: &[&str]) -> Result<EnemyReport, DecodeError> {
    expect_fields(tag, fields, 6)?;
    let spotter = fields[1].trim();
    if spotter.is_empty() {
        return Err(DecodeError::EmptySpotter);
    }
    Ok(EnemyReport {
        spotter: spotter.to_string(),
        spotter_x: parse_coordinate("spotterX", fields[2])?,
        spotter_y: parse_coordinate("spotterY", fields[3])?,
        enemy_x: parse_coordinate("enemyX", fields[4])?,
        enemy_y: parse_coordinate("enemyY", fields[5])?,
    })
}

/// 味方の報告した敵位置に、自機の編隊スロットに応じたずらしを加える
///
/// # 引数
///
/// * `enemy` - 報告された敵位置
/// * `observer` - 自機の推定位置（Ring 方式で使用）
/// * `my_slot` - 自機のスロット
/// * `spotter_slot` - 報告者のスロット
/// * `config` - 編隊設定
///
/// # 戻り値
///
/// 自機が向かうべき位置
pub fn formation_target(
    enemy: Position2D,
    observer: Position2D,
    my_slot: i32,
    spotter_slot: i32,
    config: &CoordinationConfig,
) -> Position2D {
    match config.formation {
        FormationStyle::Lateral => Position2D::new(
            enemy.x + f64::from(my_slot - spotter_slot) * config.flank_offset_x,
            enemy.y,
        ),
        FormationStyle::Ring => {
            // 自機側の円周上に止まり、正面衝突を避ける
            let toward_observer = observer.bearing_to(&enemy) + PI;
            let spread = f64::from(my_slot.signum()) * config.flank_angle;
            enemy.offset(toward_observer + spread, config.flank_radius)
        }
    }
}
