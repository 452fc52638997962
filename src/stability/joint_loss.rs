use crate::config::StabilityConfig;
use crate::pose::Pose;
use crate::stability::last_good::LastKnownGood;
use crate::stability::localizer::JointSet;
use crate::stability::mirror::MIRROR_REFERENCE_CONFIDENCE;

/// 関節消失の分類結果
///
/// 空間的なジャンプ（バナナ）とは独立の検出。位置がおかしいのではなく、
/// 信頼度が崩落して「追跡されなくなった」関節を扱う
#[derive(Debug, Clone, Default, PartialEq)]
pub struct JointLoss {
    /// 対側が信頼できる消失関節 → ミラー復元候補
    pub mirrorable: JointSet,
    /// last-known-good フォールバック行きの消失関節
    pub fallback: JointSet,
}

impl JointLoss {
    pub fn is_empty(&self) -> bool {
        self.mirrorable.is_empty() && self.fallback.is_empty()
    }
}

/// 信頼度崩落による関節消失の検出
///
/// 前フレーム（またはキャッシュ）で min_confidence 以上だった関節が
/// 今フレームで下回った場合に「消失」とする。消失関節ごとに、
/// 対側関節が信頼できればミラー候補、そうでなければフォールバック。
/// 正中線上の関節（鼻・目・耳）は常にフォールバック行き
pub fn detect_joint_loss(
    current: &Pose,
    previous: Option<&Pose>,
    cache: &LastKnownGood,
    config: &StabilityConfig,
) -> JointLoss {
    let mut loss = JointLoss::default();

    for (i, kp) in current.keypoints.iter().enumerate() {
        if kp.is_valid(config.min_confidence) {
            continue;
        }
        let index = match crate::pose::KeypointIndex::from_index(i) {
            Some(index) => index,
            None => continue,
        };

        // 直前まで追跡できていた関節のみ「消失」扱い
        let was_tracked = previous
            .map(|prev| prev.get(index).is_valid(config.min_confidence))
            .unwrap_or(false)
            || cache
                .get(index)
                .map(|cached| cached.is_valid(config.min_confidence))
                .unwrap_or(false);
        if !was_tracked {
            continue;
        }

        if index.is_midline() {
            loss.fallback.insert(index);
            continue;
        }

        let contralateral = current.get(index.mirrored());
        if contralateral.confidence > MIRROR_REFERENCE_CONFIDENCE {
            loss.mirrorable.insert(index);
        } else {
            loss.fallback.insert(index);
        }
    }

    loss
}
