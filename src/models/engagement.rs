use std::cmp::Ordering;
use std::f64::consts::FRAC_PI_2;

use tracing::debug;

use crate::config::EngagementConfig;
use crate::models::common::{math_utils, Contact, ContactKind, TurnDirection};
use crate::models::perception::Perception;

/// 交戦対象として最適な敵を選択
///
/// 射程内で残骸に遮蔽されていない敵のうち、主機を副機より優先し、
/// 同種なら最も近いものを選びます。
pub fn find_best_hostile(perception: &Perception<'_>, max_range: f64) -> Option<Contact> {
    perception
        .radar
        .iter()
        .filter(|c| c.kind.is_hostile() && c.range <= max_range)
        .filter(|c| !perception.line_of_sight_occluded(c.bearing, c.range))
        .min_by(|a, b| {
            let rank = |c: &Contact| u8::from(c.kind != ContactKind::OpponentPrimary);
            rank(*a)
                .cmp(&rank(*b))
                .then(a.range.partial_cmp(&b.range).unwrap_or(Ordering::Equal))
        })
        .copied()
}

/// 射線上（目標より手前）にいる味方
pub fn teammate_in_line(radar: &[Contact], target: &Contact, eps: f64) -> Option<Contact> {
    radar
        .iter()
        .filter(|c| c.kind.is_teammate() && c.range < target.range)
        .find(|c| math_utils::is_same_direction(c.bearing, target.bearing, eps))
        .copied()
}

/// 1ティック分の交戦判断
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FirePlan {
    Fire { bearing: f64 },
    /// 味方が射線上にいるため射撃を控え、方位をずらす
    Nudge { heading: f64 },
}

/// 射撃を控えた回数と、ずらす向きを保持する
///
/// 向きは射線が空くまで固定し、その向きへ進めなかった時だけ反転します。
/// 控えた回数が `sidestep_after` を超えたら、射線と直角に横移動します。
#[derive(Debug, Clone, Default)]
pub struct Engagement {
    withheld: u32,
    side: Option<TurnDirection>,
}

impl Engagement {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn withheld(&self) -> u32 {
        self.withheld
    }

    pub fn side(&self) -> Option<TurnDirection> {
        self.side
    }

    pub fn reset(&mut self) {
        self.withheld = 0;
        self.side = None;
    }

    /// ずらした方位へ前進できなかったことを通知（向きを反転）
    pub fn note_blocked(&mut self) {
        if let Some(side) = self.side.as_mut() {
            *side = side.flipped();
            debug!(side = ?*side, "nudge direction blocked, switching side");
        }
    }

    /// 目標への射撃可否を判断
    ///
    /// # 引数
    ///
    /// * `target` - 交戦対象
    /// * `radar` - 今ティックのレーダー観測
    /// * `config` - 交戦設定
    ///
    /// # 戻り値
    ///
    /// 射撃するか、味方を避けるための方位
    pub fn plan(&mut self, target: &Contact, radar: &[Contact], config: &EngagementConfig) -> FirePlan {
        let Some(teammate) = teammate_in_line(radar, target, config.teammate_line_eps) else {
            self.reset();
            return FirePlan::Fire {
                bearing: target.bearing,
            };
        };

        // 最初は味方の反対側へずらす
        let side = *self.side.get_or_insert(if math_utils::is_on_right(teammate.bearing, target.bearing) {
            TurnDirection::Left
        } else {
            TurnDirection::Right
        });
        self.withheld = self.withheld.saturating_add(1);

        let offset = if self.withheld > config.sidestep_after {
            FRAC_PI_2
        } else {
            config.nudge_offset
        };
        let heading = math_utils::normalize_angle(target.bearing + side.sign() * offset);
        debug!(withheld = self.withheld, ?side, offset, "teammate in line of fire, nudging");
        FirePlan::Nudge { heading }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{AngleConfig, PerceptionConfig};

    fn best(radar: &[Contact]) -> Option<Contact> {
        let (a, r) = (AngleConfig::default(), PerceptionConfig::default());
        let p = Perception::new(ContactKind::Nothing, radar, 0.0, &a, &r, 50.0);
        find_best_hostile(&p, 400.0)
    }

    #[test]
    fn test_primary_preferred_over_nearer_secondary() {
        let radar = [
            Contact::new(ContactKind::OpponentSecondary, 1.0, 100.0),
            Contact::new(ContactKind::OpponentPrimary, 2.0, 300.0),
            Contact::new(ContactKind::OpponentPrimary, 3.0, 250.0),
        ];
        assert_eq!(best(&radar).map(|c| c.range), Some(250.0));
    }

    #[test]
    fn test_out_of_range_and_occluded_excluded() {
        let radar = [
            Contact::new(ContactKind::OpponentPrimary, 1.0, 500.0),
            Contact::new(ContactKind::Wreck, 2.0, 100.0),
            Contact::new(ContactKind::OpponentPrimary, 2.0, 300.0),
        ];
        assert_eq!(best(&radar), None);

        let radar = [
            Contact::new(ContactKind::Wreck, 2.0, 100.0),
            Contact::new(ContactKind::OpponentPrimary, 2.0, 300.0),
            Contact::new(ContactKind::OpponentSecondary, 4.0, 350.0),
        ];
        assert_eq!(best(&radar).map(|c| c.kind), Some(ContactKind::OpponentSecondary));
    }

    #[test]
    fn test_fire_when_line_clear() {
        let config = EngagementConfig::default();
        let target = Contact::new(ContactKind::OpponentPrimary, 1.0, 300.0);
        let radar = [target, Contact::new(ContactKind::TeamPrimary, 1.0, 400.0)];
        let mut engagement = Engagement::new();
        assert_eq!(engagement.plan(&target, &radar, &config), FirePlan::Fire { bearing: 1.0 });
    }

    #[test]
    fn test_teammate_in_line_withholds_fire() {
        let config = EngagementConfig::default();
        let target = Contact::new(ContactKind::OpponentPrimary, 1.0, 300.0);
        let radar = [target, Contact::new(ContactKind::TeamPrimary, 1.05, 150.0)];
        let mut engagement = Engagement::new();

        let FirePlan::Nudge { heading } = engagement.plan(&target, &radar, &config) else {
            panic!("expected nudge");
        };
        // 味方は右側にいるので左へずらす
        assert!((heading - (1.0 - config.nudge_offset)).abs() < 1e-9);
        assert!(math_utils::angular_distance(heading, target.bearing) <= config.nudge_offset + 1e-9);
    }

    #[test]
    fn test_nudge_side_holds_until_blocked() {
        let config = EngagementConfig::default();
        let target = Contact::new(ContactKind::OpponentPrimary, 1.0, 300.0);
        let radar = [target, Contact::new(ContactKind::TeamPrimary, 1.05, 150.0)];
        let mut engagement = Engagement::new();

        for _ in 0..config.sidestep_after {
            let FirePlan::Nudge { heading } = engagement.plan(&target, &radar, &config) else {
                panic!("expected nudge");
            };
            assert!(heading < 1.0);
        }
        assert_eq!(engagement.side(), Some(TurnDirection::Left));

        engagement.note_blocked();
        let FirePlan::Nudge { heading } = engagement.plan(&target, &radar, &config) else {
            panic!("expected nudge");
        };
        assert!(heading > 1.0);
    }

    #[test]
    fn test_long_withhold_escalates_to_sidestep() {
        let config = EngagementConfig::default();
        let target = Contact::new(ContactKind::OpponentPrimary, 0.0, 300.0);
        let radar = [target, Contact::new(ContactKind::TeamPrimary, 0.0, 150.0)];
        let mut engagement = Engagement::new();

        let mut last = None;
        for _ in 0..=config.sidestep_after {
            last = Some(engagement.plan(&target, &radar, &config));
        }
        let Some(FirePlan::Nudge { heading }) = last else {
            panic!("expected nudge");
        };
        assert!((math_utils::angular_distance(heading, target.bearing) - FRAC_PI_2).abs() < 1e-9);

        // 射線が空けば状態は消える
        let clear = [target];
        assert_eq!(engagement.plan(&target, &clear, &config), FirePlan::Fire { bearing: 0.0 });
        assert_eq!(engagement.withheld(), 0);
        assert_eq!(engagement.side(), None);
    }
}
