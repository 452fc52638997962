use crate::pose::Pose;

/// 平滑化をスキップする信頼度の下限
/// 低信頼度の点は混ぜるに値する「現在値」を持たないため素通しする
const SMOOTH_MIN_CONFIDENCE: f64 = 0.3;

/// キーポイントごとの指数平滑化
///
/// new = alpha * current + (1 - alpha) * previous
/// 信頼度は現在フレームの値を保持する
pub fn smooth_pose(current: &Pose, previous: &Pose, alpha: f64) -> Pose {
    let mut result = current.clone();
    for (kp, prev) in result.keypoints.iter_mut().zip(previous.keypoints.iter()) {
        if kp.confidence < SMOOTH_MIN_CONFIDENCE {
            continue;
        }
        kp.x = alpha * kp.x + (1.0 - alpha) * prev.x;
        kp.y = alpha * kp.y + (1.0 - alpha) * prev.y;
    }
    result
}

/// フリーズポーズの慣性減衰シミュレーション
///
/// 各キーポイントを最後に観測した速度×decayで外挿する。
/// 静止ホールドの代わりにゆっくり流れる動きを与える純粋な見た目の補正で、
/// 下流の数値解析には使わないこと
pub fn simulate_pose(freeze: &Pose, prev_freeze: &Pose, decay: f64) -> Pose {
    let mut result = freeze.clone();
    for (kp, prev) in result.keypoints.iter_mut().zip(prev_freeze.keypoints.iter()) {
        let vx = kp.x - prev.x;
        let vy = kp.y - prev.y;
        kp.x += vx * decay;
        kp.y += vy * decay;
    }
    result
}
