use crate::config::StabilityConfig;
use crate::pose::{KeypointIndex, Pose};
use crate::stability::banana::{
    angle_delta, ratio_out_of_range, segment_ratio, Limb, Side, CHECK_ANGLES, CHECK_SEGMENTS,
};

/// 関節インデックスの集合（固定長ビットマップ）
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct JointSet {
    bits: [bool; KeypointIndex::COUNT],
}

impl JointSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, index: KeypointIndex) {
        self.bits[index as usize] = true;
    }

    pub fn contains(&self, index: KeypointIndex) -> bool {
        self.bits[index as usize]
    }

    pub fn is_empty(&self) -> bool {
        !self.bits.iter().any(|&b| b)
    }

    pub fn len(&self) -> usize {
        self.bits.iter().filter(|&&b| b).count()
    }

    pub fn iter(&self) -> impl Iterator<Item = KeypointIndex> + '_ {
        self.bits
            .iter()
            .enumerate()
            .filter(|(_, &b)| b)
            .filter_map(|(i, _)| KeypointIndex::from_index(i))
    }
}

/// 四肢カテゴリごとの破損マップ
///
/// 全身検出（短絡あり）と違い、4角すべてを評価して破損箇所と
/// 体側を特定する。フレーム全体を捨てる代わりの部分的・外科的補正を
/// 可能にする
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CorruptionMap {
    /// 補正対象の関節（違反したチェックの遠位側: 肘+手首 / 膝+足首など）
    pub corrupted: JointSet,
    /// 腕の破損側。両腕破損なら both_arms が立つ
    pub corrupted_arm: Option<Side>,
    pub both_arms: bool,
    /// 脚の破損側。両脚破損なら both_legs が立つ
    pub corrupted_leg: Option<Side>,
    pub both_legs: bool,
}

impl CorruptionMap {
    /// ミラー復元可能か: 破損があり、かつどのカテゴリも両側破損ではない
    /// （ミラー元となる無傷の対側が存在する）
    pub fn can_mirror(&self) -> bool {
        if self.corrupted.is_empty() {
            return false;
        }
        !self.both_arms && !self.both_legs
    }

    /// 腕のミラー元（無傷側）
    pub fn arm_mirror_source(&self) -> Option<Side> {
        match (self.corrupted_arm, self.both_arms) {
            (Some(side), false) => Some(side.opposite()),
            _ => None,
        }
    }

    /// 脚のミラー元（無傷側）
    pub fn leg_mirror_source(&self) -> Option<Side> {
        match (self.corrupted_leg, self.both_legs) {
            (Some(side), false) => Some(side.opposite()),
            _ => None,
        }
    }

    fn record(&mut self, side: Side, limb: Limb, distal: &[KeypointIndex]) {
        for &idx in distal {
            self.corrupted.insert(idx);
        }
        let (slot, both) = match limb {
            Limb::Arm => (&mut self.corrupted_arm, &mut self.both_arms),
            Limb::Leg => (&mut self.corrupted_leg, &mut self.both_legs),
        };
        match *slot {
            None => *slot = Some(side),
            Some(existing) if existing != side => *both = true,
            Some(_) => {}
        }
    }
}

/// 破損関節の局所化
///
/// 全身検出と同じセグメント比・角度チェックを短絡なしで再実行し、
/// どのチェックが閾値を超えたか・どちらの体側かを記録する。
/// 角度を保存したままの純粋な長さジャンプ（手首が同一レイ上で
/// 前腕長2倍へスナップ等）もセグメント比パスで局所化される
pub fn localize_corruption(
    current: &Pose,
    previous: &Pose,
    config: &StabilityConfig,
) -> CorruptionMap {
    let mut map = CorruptionMap::default();

    for segment in &CHECK_SEGMENTS {
        // 幅セグメント（肩幅・腰幅）は体側を持たないため局所化不能
        let (side, limb) = match segment.limb {
            Some(pair) => pair,
            None => continue,
        };
        let ratio = match segment_ratio(current, previous, segment, config.min_confidence) {
            Some(ratio) => ratio,
            None => continue,
        };
        if ratio_out_of_range(ratio, config.max_segment_change) {
            map.record(side, limb, segment.distal);
        }
    }

    for angle in CHECK_ANGLES {
        let delta = match angle_delta(current, previous, &angle, config.min_confidence) {
            Some(delta) => delta,
            None => continue,
        };
        if delta > config.max_angle_change_deg {
            // 頂点（肘/膝）と遠位端（手首/足首）を補正対象に
            map.record(angle.side, angle.limb, &[angle.vertex, angle.b]);
        }
    }

    map
}
