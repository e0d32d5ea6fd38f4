//! # Config モジュール
//!
//! エージェント制御コアの全チューニングパラメータを YAML から読み込みます。
//!
//! 閾値やイプシロンは固定の契約ではなく調整可能な値として扱います。各セクションは
//! `#[serde(default)]` を持つため、部分的な設定ファイルでも読み込めます。

use std::f64::consts::PI;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::models::common::Position2D;
use crate::models::role::{AgentClass, Role};

/// 移動・機体寸法
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct MotionConfig {
    /// 1ティックあたりの移動量
    pub speed: f64,
    /// 機体半径（遮蔽判定に使用）
    pub agent_radius: f64,
    /// 前方センサーの検知距離（境界座標の補正に使用）
    pub front_sensor_range: f64,
}

impl Default for MotionConfig {
    fn default() -> Self {
        Self {
            speed: 3.0,
            agent_radius: 50.0,
            front_sensor_range: 300.0,
        }
    }
}

/// 角度の許容誤差とコーン幅
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct AngleConfig {
    /// 「目標に向いたか」の粗い判定
    pub coarse_eps: f64,
    /// 回避中の細かい旋回判定
    pub fine_eps: f64,
    /// レーダー物体がある進路上にあるかの判定
    pub radar_ray_eps: f64,
    pub front_half_width: f64,
    pub rear_half_width: f64,
}

impl Default for AngleConfig {
    fn default() -> Self {
        Self {
            coarse_eps: 0.1,
            fine_eps: 0.05,
            radar_ray_eps: 0.15,
            front_half_width: PI / 4.0,
            rear_half_width: PI / 4.0,
        }
    }
}

/// 種類ごとの前方閉塞判定距離
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct PerceptionConfig {
    pub wreck_range: f64,
    pub teammate_primary_range: f64,
    /// 敵味方を問わず副機の判定距離
    pub secondary_range: f64,
    pub opponent_range: f64,
}

impl Default for PerceptionConfig {
    fn default() -> Self {
        Self {
            wreck_range: 100.0,
            teammate_primary_range: 120.0,
            secondary_range: 80.0,
            opponent_range: 200.0,
        }
    }
}

/// 回避エンジンのエスカレーション設定
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct AvoidanceConfig {
    /// 左右の混雑度を集計する半径
    pub scan_radius: f64,
    /// 1段あたりの旋回角
    pub small_step: f64,
    /// この回数連続で塞がれたら脱出動作に移る
    pub escalation_threshold: u32,
    /// 脱出時の後退ティック数
    pub escape_back_steps: u32,
    /// 後退後の転回角
    pub escape_turn: f64,
    /// 空き方位を見つけた後に必ず進むティック数
    pub commit_steps: u32,
    /// 壁スキャン全周失敗時の後退ティック数
    pub wall_back_steps: u32,
    /// 進路上レーダー判定で再旋回できる上限
    pub max_ray_retries: u32,
    /// 進路上の近接物体を見る半径
    pub proximity_radius: f64,
}

impl Default for AvoidanceConfig {
    fn default() -> Self {
        Self {
            scan_radius: 250.0,
            small_step: PI / 6.0,
            escalation_threshold: 5,
            escape_back_steps: 3,
            escape_turn: PI,
            commit_steps: 1,
            wall_back_steps: 2,
            max_ray_retries: 12,
            proximity_radius: 150.0,
        }
    }
}

/// 目標捕捉と交戦
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct EngagementConfig {
    pub hostile_range: f64,
    /// 味方が射線上にいるとみなす角度差
    pub teammate_line_eps: f64,
    /// 射線が味方で塞がれた時の方位ずらし量
    pub nudge_offset: f64,
    /// この回数連続で射撃を控えたら射線と直角に横移動する
    pub sidestep_after: u32,
    /// 撤退中でも撃ち返す前方コーン半角
    pub snap_shot_cone: f64,
    /// 副機も射撃するか
    pub secondary_fires: bool,
}

impl Default for EngagementConfig {
    fn default() -> Self {
        Self {
            hostile_range: 400.0,
            teammate_line_eps: 0.15,
            nudge_offset: PI / 18.0,
            sidestep_after: 12,
            snap_shot_cone: 0.35,
            secondary_fires: false,
        }
    }
}

/// 編隊オフセットの方式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
pub enum FormationStyle {
    /// x 方向にスロット差 × flank_offset_x ずらす
    Lateral,
    /// 目標の裏側 flank_radius の円周上にスロット × flank_angle で展開
    Ring,
}

/// チーム連携
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct CoordinationConfig {
    /// 味方報告の有効ティック数
    pub report_expiry: u32,
    /// 自機で見失った敵位置を追う猶予ティック数
    pub sighting_grace: u32,
    /// 味方位置（報告者座標）の有効ティック数
    pub teammate_expiry: u32,
    pub formation: FormationStyle,
    pub flank_offset_x: f64,
    pub flank_radius: f64,
    pub flank_angle: f64,
    pub wreck_tolerance: f64,
    pub arrival_precision: f64,
    pub border_margin: f64,
}

impl Default for CoordinationConfig {
    fn default() -> Self {
        Self {
            report_expiry: 20,
            sighting_grace: 80,
            teammate_expiry: 200,
            formation: FormationStyle::Lateral,
            flank_offset_x: 150.0,
            flank_radius: 200.0,
            flank_angle: 20f64.to_radians(),
            wreck_tolerance: 25.0,
            arrival_precision: 100.0,
            border_margin: 100.0,
        }
    }
}

/// 時間関連の設定（ティック数）
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TimingConfig {
    /// 起動直後に停止して待つティック数
    pub stop_cooldown: u32,
    pub retreat_ticks: u32,
    /// 味方に道を譲って待つ上限
    pub yield_wait_ticks: u32,
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            stop_cooldown: 20,
            retreat_ticks: 40,
            yield_wait_ticks: 5,
        }
    }
}

/// 役割ごとの初期位置
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct SpawnTable {
    pub north_wing: Position2D,
    pub center: Position2D,
    pub south_wing: Position2D,
    pub north_scout: Position2D,
    pub south_scout: Position2D,
}

impl Default for SpawnTable {
    fn default() -> Self {
        Self {
            north_wing: Position2D::new(200.0, 800.0),
            center: Position2D::new(200.0, 1000.0),
            south_wing: Position2D::new(200.0, 1200.0),
            north_scout: Position2D::new(500.0, 800.0),
            south_scout: Position2D::new(500.0, 1200.0),
        }
    }
}

impl SpawnTable {
    pub fn origin_of(&self, role: Role) -> Position2D {
        match role {
            Role::NorthWing => self.north_wing,
            Role::Center => self.center,
            Role::SouthWing => self.south_wing,
            Role::NorthScout => self.north_scout,
            Role::SouthScout => self.south_scout,
        }
    }

    /// 主機初期位置の中点（撤退先の既定値）
    pub fn midpoint(&self) -> Position2D {
        Position2D::new(
            (self.north_wing.x + self.south_wing.x) / 2.0,
            (self.north_wing.y + self.south_wing.y) / 2.0,
        )
    }
}

/// エージェント設定全体
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct AgentConfig {
    pub class: AgentClass,
    pub motion: MotionConfig,
    pub angles: AngleConfig,
    pub perception: PerceptionConfig,
    pub avoidance: AvoidanceConfig,
    pub engagement: EngagementConfig,
    pub coordination: CoordinationConfig,
    pub timing: TimingConfig,
    pub spawns: SpawnTable,
    /// 明示的な撤退地点（未指定なら初期位置の中点）
    pub rally_point: Option<Position2D>,
}

impl AgentConfig {
    /// YAMLファイルから設定を読み込み
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();

        if !path.exists() {
            return Err(ConfigError::FileNotFound(path.to_path_buf()));
        }

        let contents =
            fs::read_to_string(path).map_err(|e| ConfigError::Io(path.to_path_buf(), e))?;

        let config = Self::from_yaml_str(&contents)
            .map_err(|e| ConfigError::Parse(path.to_path_buf(), e))?;

        config.validate()?;
        Ok(config)
    }

    pub fn from_yaml_str(contents: &str) -> Result<Self, serde_yaml::Error> {
        serde_yaml::from_str(contents)
    }

    /// 設定の基本的な検証
    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |msg: &str| -> Result<(), ConfigError> {
            Err(ConfigError::Validation(msg.to_string()))
        };

        if self.motion.speed <= 0.0 {
            return invalid("motion.speed must be positive");
        }
        if self.motion.agent_radius <= 0.0 {
            return invalid("motion.agent_radius must be positive");
        }
        let angles = &self.angles;
        if angles.coarse_eps <= 0.0 || angles.fine_eps <= 0.0 || angles.radar_ray_eps <= 0.0 {
            return invalid("angle epsilons must be positive");
        }
        for half_width in [angles.front_half_width, angles.rear_half_width] {
            if half_width <= 0.0 || half_width >= PI {
                return invalid("cone half widths must lie in (0, π)");
            }
        }
        let avoidance = &self.avoidance;
        if avoidance.small_step <= 0.0 || avoidance.small_step > PI {
            return invalid("avoidance.small_step must lie in (0, π]");
        }
        if avoidance.escape_turn <= angles.fine_eps || avoidance.escape_turn > PI {
            return invalid("avoidance.escape_turn must lie in (fine_eps, π]");
        }
        if avoidance.escalation_threshold == 0 {
            return invalid("avoidance.escalation_threshold must be at least 1");
        }
        if avoidance.commit_steps == 0 {
            return invalid("avoidance.commit_steps must be at least 1");
        }
        if self.engagement.sidestep_after == 0 {
            return invalid("engagement.sidestep_after must be at least 1");
        }
        if self.coordination.arrival_precision <= 0.0 {
            return invalid("coordination.arrival_precision must be positive");
        }

        Ok(())
    }

    /// 撤退地点の既定値
    pub fn default_rally_point(&self) -> Position2D {
        self.rally_point.unwrap_or_else(|| self.spawns.midpoint())
    }

    /// 設定の概要を表示
    pub fn print_summary(&self) {
        println!("=== エージェント設定 ===");
        println!("機体種別: {:?}", self.class);
        println!("速度: {:.1}/tick  半径: {:.1}", self.motion.speed, self.motion.agent_radius);
        println!(
            "回避: {:.0}°刻み, {}回で脱出 (後退{}tick, 転回{:.0}°)",
            self.avoidance.small_step.to_degrees(),
            self.avoidance.escalation_threshold,
            self.avoidance.escape_back_steps,
            self.avoidance.escape_turn.to_degrees()
        );
        println!(
            "連携: 報告有効{}tick, 編隊{:?}",
            self.coordination.report_expiry, self.coordination.formation
        );
        println!("交戦距離: {:.0}", self.engagement.hostile_range);
    }
}

/// 設定読み込みエラー
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("設定ファイルが見つかりません: {}", .0.display())]
    FileNotFound(PathBuf),

    #[error("ファイル読み込みエラー {}: {1}", .0.display())]
    Io(PathBuf, #[source] std::io::Error),

    #[error("YAML解析エラー {}: {1}", .0.display())]
    Parse(PathBuf, #[source] serde_yaml::Error),

    #[error("設定検証エラー: {0}")]
    Validation(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        assert!(AgentConfig::default().validate().is_ok());
    }

    #[test]
    fn test_partial_yaml_keeps_defaults() {
        let yaml = "class: Secondary\navoidance:\n  escalation_threshold: 3\n";
        let config = AgentConfig::from_yaml_str(yaml).unwrap();
        assert_eq!(config.class, AgentClass::Secondary);
        assert_eq!(config.avoidance.escalation_threshold, 3);
        assert_eq!(config.avoidance.escape_back_steps, 3);
        assert_eq!(config.coordination.report_expiry, 20);
    }

    #[test]
    fn test_validation_rejects_bad_values() {
        let mut config = AgentConfig::default();
        config.motion.speed = 0.0;
        assert!(matches!(config.validate(), Err(ConfigError::Validation(_))));

        let mut config = AgentConfig::default();
        config.angles.front_half_width = PI;
        assert!(config.validate().is_err());

        let mut config = AgentConfig::default();
        config.avoidance.escalation_threshold = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_missing_file() {
        let result = AgentConfig::from_file("does/not/exist.yaml");
        assert!(matches!(result, Err(ConfigError::FileNotFound(_))));
    }

    #[test]
    fn test_rally_point_fallback() {
        let config = AgentConfig::default();
        assert_eq!(config.default_rally_point(), Position2D::new(200.0, 1000.0));
    }
}
