use crate::pose::{Keypoint, KeypointIndex, Pose};

/// 2点間のユークリッド距離
pub fn distance(a: &Keypoint, b: &Keypoint) -> f64 {
    let dx = a.x - b.x;
    let dy = a.y - b.y;
    (dx * dx + dy * dy).sqrt()
}

/// セグメント長（2関節間の距離）
///
/// どちらかの端点の信頼度が閾値未満なら None（証拠不十分、破損扱いにはしない）
pub fn segment_length(
    pose: &Pose,
    a: KeypointIndex,
    b: KeypointIndex,
    min_confidence: f64,
) -> Option<f64> {
    let ka = pose.get(a);
    let kb = pose.get(b);
    if !ka.is_valid(min_confidence) || !kb.is_valid(min_confidence) {
        return None;
    }
    Some(distance(ka, kb))
}

/// vertex における p1・p2 への2本のレイがなす角（度）
///
/// 内積/arccos 公式。レイ長が0の退化ケースは NaN を伝播させず 0 を返す
pub fn calculate_angle(p1: &Keypoint, vertex: &Keypoint, p2: &Keypoint) -> f64 {
    let v1x = p1.x - vertex.x;
    let v1y = p1.y - vertex.y;
    let v2x = p2.x - vertex.x;
    let v2y = p2.y - vertex.y;

    let len1 = (v1x * v1x + v1y * v1y).sqrt();
    let len2 = (v2x * v2x + v2y * v2y).sqrt();
    if len1 == 0.0 || len2 == 0.0 {
        return 0.0;
    }

    let cos = ((v1x * v2x + v1y * v2y) / (len1 * len2)).clamp(-1.0, 1.0);
    cos.acos().to_degrees()
}

/// 2ポーズ間のコサイン類似度（形状の全体的な類似性）
///
/// 各ポーズを平坦化した2Dベクトル列として扱い、両方のポーズで信頼度が
/// min_confidence 以上のキーポイントペアのみを内積・ノルムに算入する。
/// 低信頼度の関節をゼロ扱いせず除外するため、部分的なオクルージョンに頑健。
/// 有効ペアなし・長さ不一致・ノルム0 の場合は 0 を返す
pub fn cosine_similarity(a: &[Keypoint], b: &[Keypoint], min_confidence: f64) -> f64 {
    if a.len() != b.len() {
        return 0.0;
    }

    let mut dot = 0.0;
    let mut mag_a = 0.0;
    let mut mag_b = 0.0;
    let mut pairs = 0usize;

    for (ka, kb) in a.iter().zip(b.iter()) {
        if !ka.is_valid(min_confidence) || !kb.is_valid(min_confidence) {
            continue;
        }
        dot += ka.x * kb.x + ka.y * kb.y;
        mag_a += ka.x * ka.x + ka.y * ka.y;
        mag_b += kb.x * kb.x + kb.y * kb.y;
        pairs += 1;
    }

    if pairs == 0 {
        return 0.0;
    }
    let denom = mag_a.sqrt() * mag_b.sqrt();
    if denom == 0.0 {
        return 0.0;
    }
    dot / denom
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_distance() {
        let a = Keypoint::new(0.0, 0.0, 1.0);
        let b = Keypoint::new(3.0, 4.0, 1.0);
        assert!((distance(&a, &b) - 5.0).abs() < 1e-9);
    }

    #[test]
    fn test_segment_length_confidence_gate() {
        let mut pose = Pose::default();
        *pose.get_mut(KeypointIndex::LeftShoulder) = Keypoint::new(100.0, 100.0, 0.9);
        *pose.get_mut(KeypointIndex::LeftElbow) = Keypoint::new(100.0, 160.0, 0.2);

        // 片側の信頼度が閾値未満 → None
        assert!(segment_length(&pose, KeypointIndex::LeftShoulder, KeypointIndex::LeftElbow, 0.3).is_none());

        // 閾値を下げれば計算できる
        let len =
            segment_length(&pose, KeypointIndex::LeftShoulder, KeypointIndex::LeftElbow, 0.1).unwrap();
        assert!((len - 60.0).abs() < 1e-9);
    }

    #[test]
    fn test_angle_right_angle() {
        let vertex = Keypoint::new(0.0, 0.0, 1.0);
        let p1 = Keypoint::new(10.0, 0.0, 1.0);
        let p2 = Keypoint::new(0.0, 10.0, 1.0);
        assert!((calculate_angle(&p1, &vertex, &p2) - 90.0).abs() < 1e-6);
    }

    #[test]
    fn test_angle_straight() {
        let vertex = Keypoint::new(0.0, 0.0, 1.0);
        let p1 = Keypoint::new(-10.0, 0.0, 1.0);
        let p2 = Keypoint::new(10.0, 0.0, 1.0);
        assert!((calculate_angle(&p1, &vertex, &p2) - 180.0).abs() < 1e-6);
    }

    #[test]
    fn test_angle_degenerate_returns_zero() {
        // vertex と p1 が同一点 → レイ長0 → 0度（NaNにしない）
        let vertex = Keypoint::new(5.0, 5.0, 1.0);
        let p1 = Keypoint::new(5.0, 5.0, 1.0);
        let p2 = Keypoint::new(10.0, 10.0, 1.0);
        assert_eq!(calculate_angle(&p1, &vertex, &p2), 0.0);
    }

    #[test]
    fn test_cosine_similarity_identical() {
        let kps = [Keypoint::new(100.0, 200.0, 0.9); KeypointIndex::COUNT];
        let sim = cosine_similarity(&kps, &kps, 0.3);
        assert!((sim - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_cosine_similarity_no_valid_pairs() {
        let low = [Keypoint::new(100.0, 200.0, 0.1); KeypointIndex::COUNT];
        let high = [Keypoint::new(100.0, 200.0, 0.9); KeypointIndex::COUNT];
        assert_eq!(cosine_similarity(&low, &high, 0.3), 0.0);
    }

    #[test]
    fn test_cosine_similarity_length_mismatch() {
        let a = [Keypoint::new(1.0, 1.0, 0.9); 17];
        let b = [Keypoint::new(1.0, 1.0, 0.9); 16];
        assert_eq!(cosine_similarity(&a, &b, 0.3), 0.0);
    }

    #[test]
    fn test_cosine_similarity_excludes_occluded() {
        // 片方のポーズで1関節だけ大きくずれているが低信頼度 → 除外されて類似度1
        let a = [Keypoint::new(100.0, 200.0, 0.9); KeypointIndex::COUNT];
        let mut b = a;
        b[0] = Keypoint::new(5000.0, -5000.0, 0.1);
        let sim = cosine_similarity(&a, &b, 0.3);
        assert!((sim - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_cosine_similarity_zero_magnitude() {
        // 全点が原点（ノルム0）でも0除算せず0を返す
        let a = [Keypoint::new(0.0, 0.0, 0.9); KeypointIndex::COUNT];
        let b = [Keypoint::new(0.0, 0.0, 0.9); KeypointIndex::COUNT];
        assert_eq!(cosine_similarity(&a, &b, 0.3), 0.0);
    }
}
