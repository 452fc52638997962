use crate::pose::{KeypointIndex, Pose};
use crate::stability::localizer::JointSet;

/// 体中心軸・ミラー元の判定に使う固定信頼度
/// （設定のmin_confidenceとは独立。ミラーの参照点はより厳しく取る）
pub const MIRROR_REFERENCE_CONFIDENCE: f64 = 0.3;

/// 体中心のX座標
///
/// 肩中点と腰中点の平均。両メンバーが信頼度0.3超のペアのみ参照に使い、
/// どちらのペアも使えなければ None（ミラー不能）
pub fn body_center_x(pose: &Pose) -> Option<f64> {
    let pair_mid = |a: KeypointIndex, b: KeypointIndex| -> Option<f64> {
        let ka = pose.get(a);
        let kb = pose.get(b);
        if ka.confidence > MIRROR_REFERENCE_CONFIDENCE && kb.confidence > MIRROR_REFERENCE_CONFIDENCE
        {
            Some((ka.x + kb.x) / 2.0)
        } else {
            None
        }
    };

    let shoulder_mid = pair_mid(KeypointIndex::LeftShoulder, KeypointIndex::RightShoulder);
    let hip_mid = pair_mid(KeypointIndex::LeftHip, KeypointIndex::RightHip);

    match (shoulder_mid, hip_mid) {
        (Some(s), Some(h)) => Some((s + h) / 2.0),
        (Some(s), None) => Some(s),
        (None, Some(h)) => Some(h),
        (None, None) => None,
    }
}

/// 破損関節を安定した対側の反射で再構築する
///
/// 6組の左右ペア（肩・肘・手首・腰・膝・足首）について、
/// 対象関節が corrupted に含まれ、かつミラー元（反対側）の信頼度が
/// 0.3を超える場合のみ、X座標を体中心で反射した位置に置き換える
/// （x' = 2*centerX - sourceX、Y座標と信頼度はミラー元のものを引き継ぐ）。
/// 列挙された破損関節以外には一切触れず、実データを最大限保存する。
/// 参照ペアが使えない場合はポーズをそのまま返す
pub fn mirror_pose(pose: &Pose, corrupted: &JointSet) -> Pose {
    let center_x = match body_center_x(pose) {
        Some(x) => x,
        None => return pose.clone(),
    };

    let mut result = pose.clone();
    for target in corrupted.iter() {
        // 正中線上の関節はミラー対象外（last-known-good側で処理）
        if target.is_midline() {
            continue;
        }
        let source = *pose.get(target.mirrored());
        if source.confidence <= MIRROR_REFERENCE_CONFIDENCE {
            continue;
        }
        let kp = result.get_mut(target);
        kp.x = 2.0 * center_x - source.x;
        kp.y = source.y;
        kp.confidence = source.confidence;
    }
    result
}
