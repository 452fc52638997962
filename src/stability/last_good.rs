use crate::pose::{Keypoint, KeypointIndex, Pose};
use crate::stability::localizer::JointSet;

/// キャッシュ適用時にキャッシュ側へ要求する信頼度
const APPLY_MIN_CONFIDENCE: f64 = 0.3;

/// 補間値として出力するキーポイントに刻印する信頼度
/// ライブの高信頼度観測より厳密に低く、下流が使える程度には高い
pub const INTERPOLATED_CONFIDENCE: f64 = 0.5;

/// 関節ごとの最終良好位置キャッシュ
///
/// ミラー復元できない関節（正中線上、または両側とも破損/消失）の
/// フォールバック。減衰や有効期限はなく、直近の高信頼度観測が常に勝つ
#[derive(Debug, Clone, Default)]
pub struct LastKnownGood {
    entries: [Option<Keypoint>; KeypointIndex::COUNT],
}

impl LastKnownGood {
    pub fn new() -> Self {
        Self::default()
    }

    /// 毎フレーム、min_confidence以上の全キーポイントでキャッシュを上書き
    pub fn update(&mut self, pose: &Pose, min_confidence: f64) {
        for (entry, kp) in self.entries.iter_mut().zip(pose.keypoints.iter()) {
            if kp.is_valid(min_confidence) {
                *entry = Some(*kp);
            }
        }
    }

    /// 消失関節にキャッシュ位置を適用する
    ///
    /// キャッシュ側の信頼度が0.3超のエントリのみ使用し、
    /// 適用した関節の信頼度は固定値0.5（補間済み）とする。
    /// エントリがない関節は元の（低信頼度の）観測をそのまま通す
    pub fn apply(&self, pose: &mut Pose, lost: &JointSet) {
        for index in lost.iter() {
            let cached = match self.entries[index as usize] {
                Some(kp) if kp.confidence > APPLY_MIN_CONFIDENCE => kp,
                _ => continue,
            };
            let kp = pose.get_mut(index);
            kp.x = cached.x;
            kp.y = cached.y;
            kp.confidence = INTERPOLATED_CONFIDENCE;
        }
    }

    pub fn get(&self, index: KeypointIndex) -> Option<&Keypoint> {
        self.entries[index as usize].as_ref()
    }

    pub fn clear(&mut self) {
        self.entries = Default::default();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_update_stores_only_confident_joints() {
        let mut cache = LastKnownGood::new();
        let mut pose = Pose::default();
        *pose.get_mut(KeypointIndex::Nose) = Keypoint::new(320.0, 80.0, 0.9);
        *pose.get_mut(KeypointIndex::LeftWrist) = Keypoint::new(260.0, 290.0, 0.2);

        cache.update(&pose, 0.3);
        assert!(cache.get(KeypointIndex::Nose).is_some());
        assert!(cache.get(KeypointIndex::LeftWrist).is_none());
    }

    #[test]
    fn test_most_recent_observation_wins() {
        let mut cache = LastKnownGood::new();
        let mut pose = Pose::default();
        *pose.get_mut(KeypointIndex::Nose) = Keypoint::new(320.0, 80.0, 0.9);
        cache.update(&pose, 0.3);

        *pose.get_mut(KeypointIndex::Nose) = Keypoint::new(350.0, 90.0, 0.5);
        cache.update(&pose, 0.3);

        let cached = cache.get(KeypointIndex::Nose).unwrap();
        assert_eq!(cached.x, 350.0);
        assert_eq!(cached.confidence, 0.5);
    }

    #[test]
    fn test_apply_marks_interpolated_confidence() {
        let mut cache = LastKnownGood::new();
        let mut good = Pose::default();
        *good.get_mut(KeypointIndex::Nose) = Keypoint::new(320.0, 80.0, 0.9);
        cache.update(&good, 0.3);

        let mut current = Pose::default();
        *current.get_mut(KeypointIndex::Nose) = Keypoint::new(10.0, 10.0, 0.05);

        let mut lost = JointSet::new();
        lost.insert(KeypointIndex::Nose);
        cache.apply(&mut current, &lost);

        let nose = current.get(KeypointIndex::Nose);
        assert_eq!(nose.x, 320.0);
        assert_eq!(nose.y, 80.0);
        assert_eq!(nose.confidence, INTERPOLATED_CONFIDENCE);
    }

    #[test]
    fn test_apply_without_entry_passes_through() {
        let cache = LastKnownGood::new();
        let mut current = Pose::default();
        *current.get_mut(KeypointIndex::Nose) = Keypoint::new(10.0, 10.0, 0.05);

        let mut lost = JointSet::new();
        lost.insert(KeypointIndex::Nose);
        cache.apply(&mut current, &lost);

        // エントリなし → 元の低信頼度観測のまま
        let nose = current.get(KeypointIndex::Nose);
        assert_eq!(nose.x, 10.0);
        assert_eq!(nose.confidence, 0.05);
    }

    #[test]
    fn test_clear() {
        let mut cache = LastKnownGood::new();
        let mut pose = Pose::default();
        *pose.get_mut(KeypointIndex::Nose) = Keypoint::new(320.0, 80.0, 0.9);
        cache.update(&pose, 0.3);
        cache.clear();
        assert!(cache.get(KeypointIndex::Nose).is_none());
    }
}
