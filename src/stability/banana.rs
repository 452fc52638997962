use crate::config::StabilityConfig;
use crate::geometry::{calculate_angle, cosine_similarity, segment_length};
use crate::pose::{KeypointIndex, Pose};
use crate::stability::ratios::{calculate_ratios, check_ratio_deviation, AnthropometricRatios};

/// 体の左右
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Side {
    Left,
    Right,
}

impl Side {
    pub fn opposite(self) -> Self {
        match self {
            Self::Left => Self::Right,
            Self::Right => Self::Left,
        }
    }
}

/// 四肢カテゴリ
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Limb {
    Arm,
    Leg,
}

/// 角度チェック対象の関節角（頂点と2本のレイ端点）
#[derive(Debug, Clone, Copy)]
pub struct LimbAngle {
    pub name: &'static str,
    pub side: Side,
    pub limb: Limb,
    pub a: KeypointIndex,
    pub vertex: KeypointIndex,
    pub b: KeypointIndex,
}

/// セグメント長比チェック対象のセグメント
#[derive(Debug, Clone, Copy)]
pub struct BodySegment {
    pub name: &'static str,
    /// 四肢カテゴリ。幅セグメント（肩幅・腰幅）は持たない
    pub limb: Option<(Side, Limb)>,
    pub a: KeypointIndex,
    pub b: KeypointIndex,
    /// このセグメントが破損した場合の補正対象（遠位側の関節）
    pub distal: &'static [KeypointIndex],
}

/// セグメント長比チェック対象の10セグメント（四肢8本 + 肩幅・腰幅）
pub const CHECK_SEGMENTS: [BodySegment; 10] = {
    use KeypointIndex::*;
    [
        BodySegment {
            name: "left_upper_arm",
            limb: Some((Side::Left, Limb::Arm)),
            a: LeftShoulder,
            b: LeftElbow,
            distal: &[LeftElbow, LeftWrist],
        },
        BodySegment {
            name: "right_upper_arm",
            limb: Some((Side::Right, Limb::Arm)),
            a: RightShoulder,
            b: RightElbow,
            distal: &[RightElbow, RightWrist],
        },
        BodySegment {
            name: "left_forearm",
            limb: Some((Side::Left, Limb::Arm)),
            a: LeftElbow,
            b: LeftWrist,
            distal: &[LeftWrist],
        },
        BodySegment {
            name: "right_forearm",
            limb: Some((Side::Right, Limb::Arm)),
            a: RightElbow,
            b: RightWrist,
            distal: &[RightWrist],
        },
        BodySegment {
            name: "left_thigh",
            limb: Some((Side::Left, Limb::Leg)),
            a: LeftHip,
            b: LeftKnee,
            distal: &[LeftKnee, LeftAnkle],
        },
        BodySegment {
            name: "right_thigh",
            limb: Some((Side::Right, Limb::Leg)),
            a: RightHip,
            b: RightKnee,
            distal: &[RightKnee, RightAnkle],
        },
        BodySegment {
            name: "left_shin",
            limb: Some((Side::Left, Limb::Leg)),
            a: LeftKnee,
            b: LeftAnkle,
            distal: &[LeftAnkle],
        },
        BodySegment {
            name: "right_shin",
            limb: Some((Side::Right, Limb::Leg)),
            a: RightKnee,
            b: RightAnkle,
            distal: &[RightAnkle],
        },
        BodySegment {
            name: "shoulder_width",
            limb: None,
            a: LeftShoulder,
            b: RightShoulder,
            distal: &[],
        },
        BodySegment {
            name: "hip_width",
            limb: None,
            a: LeftHip,
            b: RightHip,
            distal: &[],
        },
    ]
};

/// 角度チェック対象の4関節角（両肘・両膝）
pub const CHECK_ANGLES: [LimbAngle; 4] = {
    use KeypointIndex::*;
    [
        LimbAngle {
            name: "left_elbow",
            side: Side::Left,
            limb: Limb::Arm,
            a: LeftShoulder,
            vertex: LeftElbow,
            b: LeftWrist,
        },
        LimbAngle {
            name: "right_elbow",
            side: Side::Right,
            limb: Limb::Arm,
            a: RightShoulder,
            vertex: RightElbow,
            b: RightWrist,
        },
        LimbAngle {
            name: "left_knee",
            side: Side::Left,
            limb: Limb::Leg,
            a: LeftHip,
            vertex: LeftKnee,
            b: LeftAnkle,
        },
        LimbAngle {
            name: "right_knee",
            side: Side::Right,
            limb: Limb::Leg,
            a: RightHip,
            vertex: RightKnee,
            b: RightAnkle,
        },
    ]
};

/// 前フレーム長がこれ以下のセグメントは比率を計算しない
/// （微小セグメントの比率はノイズだけで発散する）
const MIN_SEGMENT_LENGTH: f64 = 10.0;

/// 最初に違反した不変条件
#[derive(Debug, Clone, PartialEq)]
pub enum BananaReason {
    /// セグメント長のフレーム間比が許容範囲外
    SegmentJump { segment: &'static str, ratio: f64 },
    /// 関節角のフレーム間変化が許容範囲外
    AngleJump { angle: &'static str, delta_deg: f64 },
    /// 全体形状のコサイン類似度が下限未満
    LowSimilarity { similarity: f64 },
    /// ベースライン体型比率からの逸脱
    RatioDeviation,
}

/// 全身破損検出の結果
#[derive(Debug, Clone, PartialEq)]
pub struct BananaCheck {
    pub is_banana: bool,
    pub reason: Option<BananaReason>,
    /// コサイン類似度。類似度チェックに到達しなかった場合は None
    pub similarity: Option<f64>,
}

impl BananaCheck {
    fn clean(similarity: Option<f64>) -> Self {
        Self {
            is_banana: false,
            reason: None,
            similarity,
        }
    }

    fn corrupted(reason: BananaReason, similarity: Option<f64>) -> Self {
        Self {
            is_banana: true,
            reason: Some(reason),
            similarity,
        }
    }
}

/// 全身「バナナフレーム」検出
///
/// チェックは固定の優先順で実行し、最初の違反で打ち切る
/// （reason は最初に違反した不変条件を指す）:
/// 1. セグメント長比（10セグメント、連続フレーム比較なのでスケール不変）
/// 2. 関節角変化（両肘・両膝）
/// 3. コサイン類似度
/// 4. ベースライン体型比率（ベースラインがある場合のみ）
///
/// 前フレームがなければ常に非破損（最初のフレームは構成上信頼する）
pub fn detect_banana(
    current: &Pose,
    previous: Option<&Pose>,
    baseline: Option<&AnthropometricRatios>,
    config: &StabilityConfig,
) -> BananaCheck {
    let prev = match previous {
        Some(prev) => prev,
        None => return BananaCheck::clean(None),
    };

    // 1. セグメント長比
    for segment in &CHECK_SEGMENTS {
        let ratio = match segment_ratio(current, prev, segment, config.min_confidence) {
            Some(ratio) => ratio,
            None => continue,
        };
        if ratio_out_of_range(ratio, config.max_segment_change) {
            return BananaCheck::corrupted(
                BananaReason::SegmentJump {
                    segment: segment.name,
                    ratio,
                },
                None,
            );
        }
    }

    // 2. 関節角変化
    for angle in CHECK_ANGLES {
        if let Some(delta) = angle_delta(current, prev, &angle, config.min_confidence) {
            if delta > config.max_angle_change_deg {
                return BananaCheck::corrupted(
                    BananaReason::AngleJump {
                        angle: angle.name,
                        delta_deg: delta,
                    },
                    None,
                );
            }
        }
    }

    // 3. コサイン類似度
    let similarity = cosine_similarity(&current.keypoints, &prev.keypoints, config.min_confidence);
    if similarity < config.min_cosine_similarity {
        return BananaCheck::corrupted(
            BananaReason::LowSimilarity { similarity },
            Some(similarity),
        );
    }

    // 4. ベースライン体型比率
    if let Some(base) = baseline {
        if let Some(current_ratios) = calculate_ratios(current, config.min_confidence) {
            if check_ratio_deviation(&current_ratios, base, config.ratio_tolerance) {
                return BananaCheck::corrupted(BananaReason::RatioDeviation, Some(similarity));
            }
        }
    }

    BananaCheck::clean(Some(similarity))
}

/// 両フレームで計算可能な場合のみセグメント長比（現在長 / 前フレーム長）を返す
///
/// 前フレーム長が MIN_SEGMENT_LENGTH 以下なら None
pub(crate) fn segment_ratio(
    current: &Pose,
    previous: &Pose,
    segment: &BodySegment,
    min_confidence: f64,
) -> Option<f64> {
    let prev_len = match segment_length(previous, segment.a, segment.b, min_confidence) {
        Some(len) if len > MIN_SEGMENT_LENGTH => len,
        _ => return None,
    };
    let cur_len = segment_length(current, segment.a, segment.b, min_confidence)?;
    Some(cur_len / prev_len)
}

/// 比率が許容レンジ（1/max_change 〜 max_change）の外か
pub(crate) fn ratio_out_of_range(ratio: f64, max_change: f64) -> bool {
    ratio > max_change || ratio < 1.0 / max_change
}

/// 両フレームで3点すべて有効な場合のみ角度差を返す
pub(crate) fn angle_delta(
    current: &Pose,
    previous: &Pose,
    angle: &LimbAngle,
    min_confidence: f64,
) -> Option<f64> {
    let points = [angle.a, angle.vertex, angle.b];
    let all_valid = points.iter().all(|&idx| {
        current.get(idx).is_valid(min_confidence) && previous.get(idx).is_valid(min_confidence)
    });
    if !all_valid {
        return None;
    }

    let cur = calculate_angle(current.get(angle.a), current.get(angle.vertex), current.get(angle.b));
    let prev = calculate_angle(
        previous.get(angle.a),
        previous.get(angle.vertex),
        previous.get(angle.b),
    );
    Some((cur - prev).abs())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pose::Keypoint;

    fn standing_pose() -> Pose {
        use KeypointIndex::*;
        let mut pose = Pose::default();
        let mut set = |idx: KeypointIndex, x: f64, y: f64| {
            pose.keypoints[idx as usize] = Keypoint::new(x, y, 0.9);
        };
        set(Nose, 320.0, 80.0);
        set(LeftEye, 310.0, 70.0);
        set(RightEye, 330.0, 70.0);
        set(LeftEar, 300.0, 75.0);
        set(RightEar, 340.0, 75.0);
        set(LeftShoulder, 280.0, 150.0);
        set(RightShoulder, 360.0, 150.0);
        set(LeftElbow, 270.0, 220.0);
        set(RightElbow, 370.0, 220.0);
        set(LeftWrist, 265.0, 290.0);
        set(RightWrist, 375.0, 290.0);
        set(LeftHip, 295.0, 300.0);
        set(RightHip, 345.0, 300.0);
        set(LeftKnee, 293.0, 400.0);
        set(RightKnee, 347.0, 400.0);
        set(LeftAnkle, 291.0, 500.0);
        set(RightAnkle, 349.0, 500.0);
        pose
    }

    #[test]
    fn test_first_frame_is_trusted() {
        let pose = standing_pose();
        let check = detect_banana(&pose, None, None, &StabilityConfig::default());
        assert!(!check.is_banana);
        assert_eq!(check.reason, None);
        assert_eq!(check.similarity, None);
    }

    #[test]
    fn test_identical_frames_are_clean() {
        let pose = standing_pose();
        let check = detect_banana(&pose, Some(&pose), None, &StabilityConfig::default());
        assert!(!check.is_banana, "reason={:?}", check.reason);
        // 同一フレームのセグメント比は厳密に1.0
        let sim = check.similarity.unwrap();
        assert!(sim > 0.999, "similarity={sim}");
    }

    #[test]
    fn test_unchanged_segment_never_fires_regardless_of_threshold() {
        let pose = standing_pose();
        let mut config = StabilityConfig::default();
        // 閾値を極端に締めても、変化なし（比率1.0）ならセグメントチェックは発火しない
        config.max_segment_change = 1.0 + 1e-12;
        let check = detect_banana(&pose, Some(&pose), None, &config);
        assert!(!matches!(check.reason, Some(BananaReason::SegmentJump { .. })));
    }

    #[test]
    fn test_stretched_forearm_detected() {
        let prev = standing_pose();
        let mut cur = prev.clone();
        // 右手首が前腕長2倍の位置へスナップ
        let elbow = *cur.get(KeypointIndex::RightElbow);
        let wrist = *cur.get(KeypointIndex::RightWrist);
        *cur.get_mut(KeypointIndex::RightWrist) = Keypoint::new(
            elbow.x + (wrist.x - elbow.x) * 2.0,
            elbow.y + (wrist.y - elbow.y) * 2.0,
            0.9,
        );

        let check = detect_banana(&cur, Some(&prev), None, &StabilityConfig::default());
        assert!(check.is_banana);
        match check.reason {
            Some(BananaReason::SegmentJump { segment, ratio }) => {
                assert_eq!(segment, "right_forearm");
                assert!((ratio - 2.0).abs() < 0.01, "ratio={ratio}");
            }
            other => panic!("expected SegmentJump, got {:?}", other),
        }
    }

    #[test]
    fn test_angle_jump_detected() {
        let prev = standing_pose();
        let mut cur = prev.clone();
        // 手首を肘の反対側へ折り返す（前腕長は維持して角度だけ大きく変える）
        let elbow = *cur.get(KeypointIndex::LeftElbow);
        let wrist = *cur.get(KeypointIndex::LeftWrist);
        let dx = wrist.x - elbow.x;
        let dy = wrist.y - elbow.y;
        // 90度回転: (dx, dy) -> (-dy, dx)
        *cur.get_mut(KeypointIndex::LeftWrist) =
            Keypoint::new(elbow.x - dy, elbow.y + dx, 0.9);

        let check = detect_banana(&cur, Some(&prev), None, &StabilityConfig::default());
        assert!(check.is_banana);
        match check.reason {
            Some(BananaReason::AngleJump { angle, delta_deg }) => {
                assert_eq!(angle, "left_elbow");
                assert!(delta_deg > 25.0, "delta={delta_deg}");
            }
            other => panic!("expected AngleJump, got {:?}", other),
        }
    }

    #[test]
    fn test_full_occlusion_fails_similarity() {
        let prev = standing_pose();
        let mut cur = prev.clone();
        for kp in cur.keypoints.iter_mut() {
            kp.confidence = 0.1;
        }
        // 全関節が低信頼度 → セグメント/角度チェックはスキップ、
        // 類似度は有効ペアなしで0 → 破損扱い
        let check = detect_banana(&cur, Some(&prev), None, &StabilityConfig::default());
        assert!(check.is_banana);
        assert_eq!(
            check.reason,
            Some(BananaReason::LowSimilarity { similarity: 0.0 })
        );
    }

    #[test]
    fn test_lowering_confidence_cannot_create_banana() {
        let prev = standing_pose();
        let mut cur = prev.clone();
        // 手首を大きく動かすが信頼度を閾値未満に → セグメント/角度チェックは
        // 「証拠不十分」でスキップされ、そのチェック経由では発火しない
        *cur.get_mut(KeypointIndex::RightWrist) = Keypoint::new(5000.0, 5000.0, 0.1);

        let check = detect_banana(&cur, Some(&prev), None, &StabilityConfig::default());
        assert!(!check.is_banana, "reason={:?}", check.reason);
    }

    #[test]
    fn test_baseline_deviation_detected() {
        let prev = standing_pose();
        let baseline = calculate_ratios(&prev, 0.3).unwrap();

        // 全セグメントを一様に少しずつ変形させてもセグメント比・角度・類似度は
        // 通過するが、前腕だけ1.2倍に伸ばし続けた定常状態では比率逸脱が出る
        let mut config = StabilityConfig::default();
        config.ratio_tolerance = 0.05;

        let mut cur = prev.clone();
        let elbow = *cur.get(KeypointIndex::LeftElbow);
        let wrist = *cur.get(KeypointIndex::LeftWrist);
        *cur.get_mut(KeypointIndex::LeftWrist) = Keypoint::new(
            elbow.x + (wrist.x - elbow.x) * 1.2,
            elbow.y + (wrist.y - elbow.y) * 1.2,
            0.9,
        );
        // 前フレームも同じ変形（フレーム間の変化はない）
        let check = detect_banana(&cur, Some(&cur), Some(&baseline), &config);
        assert!(check.is_banana);
        assert_eq!(check.reason, Some(BananaReason::RatioDeviation));
    }
}
