use crate::geometry::segment_length;
use crate::pose::{KeypointIndex, Pose};

/// 四肢の長さ比によるベースライン
///
/// 幅2項目のみピクセル単位、他は無次元。カメラ距離に依存しない
/// 体型サニティチェックとして使う
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AnthropometricRatios {
    /// 肩幅（ピクセル）
    pub shoulder_width: f64,
    /// 腰幅（ピクセル）。計算不能なら0
    pub hip_width: f64,
    /// 前腕長 / 上腕長
    pub left_arm_ratio: f64,
    pub right_arm_ratio: f64,
    /// すね長 / 太もも長
    pub left_leg_ratio: f64,
    pub right_leg_ratio: f64,
    /// 肩-腰長の左右平均 / 肩幅
    pub torso_ratio: f64,
}

/// サブセグメントが欠けている場合の比率（中立値）
/// 片腕のオクルージョンでベースライン全体を無効にしない
const NEUTRAL_RATIO: f64 = 1.0;

/// ポーズから体型比率を計算する
///
/// 肩幅が計算不能、または1ピクセル未満（スケール基準なし）なら None
pub fn calculate_ratios(pose: &Pose, min_confidence: f64) -> Option<AnthropometricRatios> {
    use KeypointIndex::*;

    let shoulder_width = segment_length(pose, LeftShoulder, RightShoulder, min_confidence)?;
    if shoulder_width < 1.0 {
        return None;
    }

    let hip_width = segment_length(pose, LeftHip, RightHip, min_confidence).unwrap_or(0.0);

    let left_arm_ratio = limb_ratio(
        segment_length(pose, LeftElbow, LeftWrist, min_confidence),
        segment_length(pose, LeftShoulder, LeftElbow, min_confidence),
    );
    let right_arm_ratio = limb_ratio(
        segment_length(pose, RightElbow, RightWrist, min_confidence),
        segment_length(pose, RightShoulder, RightElbow, min_confidence),
    );
    let left_leg_ratio = limb_ratio(
        segment_length(pose, LeftKnee, LeftAnkle, min_confidence),
        segment_length(pose, LeftHip, LeftKnee, min_confidence),
    );
    let right_leg_ratio = limb_ratio(
        segment_length(pose, RightKnee, RightAnkle, min_confidence),
        segment_length(pose, RightHip, RightKnee, min_confidence),
    );

    let left_torso = segment_length(pose, LeftShoulder, LeftHip, min_confidence);
    let right_torso = segment_length(pose, RightShoulder, RightHip, min_confidence);
    let torso_ratio = match (left_torso, right_torso) {
        (Some(l), Some(r)) => (l + r) / 2.0 / shoulder_width,
        (Some(l), None) => l / shoulder_width,
        (None, Some(r)) => r / shoulder_width,
        (None, None) => NEUTRAL_RATIO,
    };

    Some(AnthropometricRatios {
        shoulder_width,
        hip_width,
        left_arm_ratio,
        right_arm_ratio,
        left_leg_ratio,
        right_leg_ratio,
        torso_ratio,
    })
}

/// 遠位セグメント長 / 近位セグメント長。どちらか欠損なら中立値
fn limb_ratio(distal: Option<f64>, proximal: Option<f64>) -> f64 {
    match (distal, proximal) {
        (Some(d), Some(p)) if p > 1.0 => d / p,
        _ => NEUTRAL_RATIO,
    }
}

/// ベースラインからの体型比率の逸脱チェック
///
/// 比率5項目のいずれかが tolerance を超えて乖離、または肩幅・腰幅の
/// 相対変化が tolerance を超えたら true（逸脱）。
/// 見かけの動きの連続性を保ったまま体型を破壊する破損
/// （手首が物理的にありえない前腕長へスナップ等）を捕捉する
pub fn check_ratio_deviation(
    current: &AnthropometricRatios,
    baseline: &AnthropometricRatios,
    tolerance: f64,
) -> bool {
    let ratio_pairs = [
        (current.left_arm_ratio, baseline.left_arm_ratio),
        (current.right_arm_ratio, baseline.right_arm_ratio),
        (current.left_leg_ratio, baseline.left_leg_ratio),
        (current.right_leg_ratio, baseline.right_leg_ratio),
        (current.torso_ratio, baseline.torso_ratio),
    ];
    for (cur, base) in ratio_pairs {
        if (cur - base).abs() > tolerance {
            return true;
        }
    }

    // 幅の相対変化。どちらかが未計測(<=0)ならスキップ
    let width_pairs = [
        (current.shoulder_width, baseline.shoulder_width),
        (current.hip_width, baseline.hip_width),
    ];
    for (cur, base) in width_pairs {
        if cur > 0.0 && base > 0.0 && (cur / base - 1.0).abs() > tolerance {
            return true;
        }
    }

    false
}
