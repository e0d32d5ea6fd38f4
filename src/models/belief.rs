use crate::models::common::{Cardinal, Position2D};

/// 共有目標の出所
#[derive(Debug, Clone, PartialEq)]
pub enum TargetSource {
    OwnSighting,
    Teammate(String),
}

/// 敵位置の推定（自機レーダーまたは味方報告）
#[derive(Debug, Clone, PartialEq)]
pub struct SharedTarget {
    pub position: Position2D,
    /// 最後に更新されてからのティック数
    pub age: u32,
    pub expires_after: u32,
    pub source: TargetSource,
}

impl SharedTarget {
    pub fn new(position: Position2D, expires_after: u32, source: TargetSource) -> Self {
        Self {
            position,
            age: 0,
            expires_after,
            source,
        }
    }

    pub fn advance(&mut self) {
        self.age = self.age.saturating_add(1);
    }

    pub fn is_expired(&self) -> bool {
        self.age > self.expires_after
    }
}

/// アリーナ境界
///
/// 各辺は一度判明したら以後上書きしません（先着優先）。
/// y 軸下向きなので北が y の最小値、南が最大値です。
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct ArenaBounds {
    pub north: Option<f64>,
    pub south: Option<f64>,
    pub east: Option<f64>,
    pub west: Option<f64>,
}

impl ArenaBounds {
    pub fn get(&self, side: Cardinal) -> Option<f64> {
        match side {
            Cardinal::North => self.north,
            Cardinal::South => self.south,
            Cardinal::East => self.east,
            Cardinal::West => self.west,
        }
    }

    /// 境界を記録
    ///
    /// # 戻り値
    ///
    /// 新たに判明した場合はtrue（既知なら値は変えない）
    pub fn record(&mut self, side: Cardinal, coordinate: f64) -> bool {
        if !coordinate.is_finite() {
            return false;
        }
        let slot = match side {
            Cardinal::North => &mut self.north,
            Cardinal::South => &mut self.south,
            Cardinal::East => &mut self.east,
            Cardinal::West => &mut self.west,
        };
        if slot.is_some() {
            return false;
        }
        *slot = Some(coordinate);
        true
    }

    pub fn is_complete(&self) -> bool {
        Cardinal::ALL.iter().all(|side| self.get(*side).is_some())
    }

    /// 判明している範囲でのアリーナ中心（不明な軸は `fallback` を使う）
    pub fn center_or(&self, fallback: Position2D) -> Position2D {
        let x = match (self.west, self.east) {
            (Some(w), Some(e)) => (w + e) / 2.0,
            _ => fallback.x,
        };
        let y = match (self.north, self.south) {
            (Some(n), Some(s)) => (n + s) / 2.0,
            _ => fallback.y,
        };
        Position2D::new(x, y)
    }

    /// `margin` 以内にある既知の境界
    pub fn near_border(&self, position: Position2D, margin: f64) -> Option<Cardinal> {
        Cardinal::ALL.into_iter().find(|side| {
            let distance = match (side, self.get(*side)) {
                (Cardinal::North, Some(n)) => position.y - n,
                (Cardinal::South, Some(s)) => s - position.y,
                (Cardinal::East, Some(e)) => e - position.x,
                (Cardinal::West, Some(w)) => position.x - w,
                (_, None) => return false,
            };
            distance <= margin
        })
    }
}

/// 残骸位置の記憶（追加のみ、近接するものは重複排除）
#[derive(Debug, Clone, Default)]
pub struct WreckMemory {
    positions: Vec<Position2D>,
}

impl WreckMemory {
    pub fn remember(&mut self, position: Position2D, tolerance: f64) -> bool {
        if self.contains_near(position, tolerance) {
            return false;
        }
        self.positions.push(position);
        true
    }

    pub fn contains_near(&self, position: Position2D, tolerance: f64) -> bool {
        self.positions.iter().any(|p| p.distance_to(&position) <= tolerance)
    }

    pub fn len(&self) -> usize {
        self.positions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }
}

/// 報告者座標から得た味方の最終位置
#[derive(Debug, Clone, PartialEq)]
pub struct TeammateSighting {
    pub name: String,
    pub position: Position2D,
    pub age: u32,
}

/// エージェントが保持する世界についての信念
#[derive(Debug, Clone, Default)]
pub struct Belief {
    pub target: Option<SharedTarget>,
    pub bounds: ArenaBounds,
    pub wrecks: WreckMemory,
    teammates: Vec<TeammateSighting>,
    teammate_expiry: u32,
}

impl Belief {
    pub fn new(teammate_expiry: u32) -> Self {
        Self {
            teammate_expiry,
            ..Self::default()
        }
    }

    /// ティック開始時の経時処理
    ///
    /// 期限切れの目標と味方位置はここで破棄されます。受信処理より前に呼ぶため、
    /// 同じティックで届いた報告は年齢 0 のまま評価されます。
    pub fn advance(&mut self) {
        if let Some(target) = self.target.as_mut() {
            target.advance();
            if target.is_expired() {
                self.target = None;
            }
        }
        let expiry = self.teammate_expiry;
        for sighting in &mut self.teammates {
            sighting.age = sighting.age.saturating_add(1);
        }
        self.teammates.retain(|s| s.age <= expiry);
    }

    /// 目標を設定（既存の目標は置き換え、年齢は 0 に戻る）
    pub fn set_target(&mut self, position: Position2D, expires_after: u32, source: TargetSource) {
        self.target = Some(SharedTarget::new(position, expires_after, source));
    }

    pub fn clear_target(&mut self) {
        self.target = None;
    }

    pub fn target_position(&self) -> Option<Position2D> {
        self.target.as_ref().map(|t| t.position)
    }

    /// 目標が既知の残骸と一致したら破棄する
    ///
    /// # 戻り値
    ///
    /// 破棄した場合はtrue
    pub fn drop_target_on_wreck(&mut self, tolerance: f64) -> bool {
        let on_wreck = self
            .target
            .as_ref()
            .is_some_and(|t| self.wrecks.contains_near(t.position, tolerance));
        if on_wreck {
            self.target = None;
        }
        on_wreck
    }

    pub fn note_teammate(&mut self, name: &str, position: Position2D) {
        match self.teammates.iter_mut().find(|s| s.name == name) {
            Some(sighting) => {
                sighting.position = position;
                sighting.age = 0;
            }
            None => self.teammates.push(TeammateSighting {
                name: name.to_string(),
                position,
                age: 0,
            }),
        }
    }

    /// 最も新しい味方位置（撤退先の候補）
    pub fn latest_teammate(&self) -> Option<Position2D> {
        self.teammates.iter().min_by_key(|s| s.age).map(|s| s.position)
    }

    pub fn teammates(&self) -> &[TeammateSighting] {
        &self.teammates
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_target_expires_after_window() {
        let mut belief = Belief::new(200);
        belief.set_target(Position2D::new(1.0, 2.0), 3, TargetSource::OwnSighting);
        for _ in 0..3 {
            belief.advance();
            assert!(belief.target.is_some());
        }
        belief.advance();
        assert!(belief.target.is_none());
    }

    #[test]
    fn test_refresh_resets_age() {
        let mut belief = Belief::new(200);
        belief.set_target(Position2D::new(1.0, 2.0), 2, TargetSource::OwnSighting);
        belief.advance();
        belief.advance();
        belief.set_target(
            Position2D::new(5.0, 5.0),
            2,
            TargetSource::Teammate("CENTER".to_string()),
        );
        belief.advance();
        let target = belief.target.as_ref().unwrap();
        assert_eq!(target.age, 1);
        assert_eq!(target.source, TargetSource::Teammate("CENTER".to_string()));
    }

    #[test]
    fn test_bounds_first_write_wins() {
        let mut bounds = ArenaBounds::default();
        assert!(bounds.record(Cardinal::North, 40.0));
        assert!(!bounds.record(Cardinal::North, 90.0));
        assert_eq!(bounds.get(Cardinal::North), Some(40.0));
        assert!(!bounds.record(Cardinal::East, f64::NAN));
        assert!(!bounds.is_complete());
    }

    #[test]
    fn test_bounds_center_and_near_border() {
        let bounds = ArenaBounds {
            north: Some(0.0),
            south: Some(2000.0),
            east: None,
            west: Some(0.0),
        };
        let fallback = Position2D::new(1500.0, 0.0);
        assert_eq!(bounds.center_or(fallback), Position2D::new(1500.0, 1000.0));
        assert_eq!(bounds.near_border(Position2D::new(500.0, 60.0), 100.0), Some(Cardinal::North));
        assert_eq!(bounds.near_border(Position2D::new(500.0, 500.0), 100.0), None);
    }

    #[test]
    fn test_wreck_memory_dedups() {
        let mut memory = WreckMemory::default();
        assert!(memory.remember(Position2D::new(100.0, 100.0), 25.0));
        assert!(!memory.remember(Position2D::new(110.0, 100.0), 25.0));
        assert!(memory.remember(Position2D::new(200.0, 100.0), 25.0));
        assert_eq!(memory.len(), 2);
    }

    #[test]
    fn test_target_dropped_on_remembered_wreck() {
        let mut belief = Belief::new(200);
        belief.wrecks.remember(Position2D::new(500.0, 500.0), 25.0);
        belief.set_target(Position2D::new(510.0, 495.0), 20, TargetSource::OwnSighting);
        assert!(belief.drop_target_on_wreck(25.0));
        assert!(belief.target.is_none());
    }

    #[test]
    fn test_teammate_tracking_prefers_freshest() {
        let mut belief = Belief::new(2);
        belief.note_teammate("CENTER", Position2D::new(1.0, 1.0));
        belief.advance();
        belief.note_teammate("NORTH_WING", Position2D::new(2.0, 2.0));
        assert_eq!(belief.latest_teammate(), Some(Position2D::new(2.0, 2.0)));
        belief.advance();
        belief.advance();
        // CENTER は期限切れ
        assert_eq!(belief.teammates().len(), 1);
    }
}
