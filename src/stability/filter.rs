use log::debug;
use serde::Serialize;
use std::collections::HashMap;

use crate::config::StabilityConfig;
use crate::geometry::cosine_similarity;
use crate::pose::Pose;
use crate::stability::banana::detect_banana;
use crate::stability::joint_loss::detect_joint_loss;
use crate::stability::last_good::LastKnownGood;
use crate::stability::localizer::localize_corruption;
use crate::stability::mirror::mirror_pose;
use crate::stability::ratios::{calculate_ratios, AnthropometricRatios};
use crate::stability::smoothing::{simulate_pose, smooth_pose};

/// トラックの動作モード
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum FilterState {
    /// ライブ検出を信頼（関節単位のミラー補正あり）
    Normal,
    /// 全身フリーズ/シミュレーション中。安定が確認できたら復帰
    Recovery,
}

/// 1フレーム分のフィルタ出力
///
/// pose は補正済みの解析可能な信号。is_banana_frame / state は
/// 診断・UI表示用であり、数値解析に混ぜないこと
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FilterResult {
    pub pose: Pose,
    pub state: FilterState,
    pub is_banana_frame: bool,
    pub stable_count: u32,
    pub similarity: Option<f64>,
}

/// ポーズスロットごとの状態。スロット間で共有されるものは一切ない
#[derive(Debug, Clone)]
struct TrackState {
    state: FilterState,
    freeze_pose: Option<Pose>,
    /// フリーズ直前のポーズ（シミュレーションの速度推定用）。
    /// NORMAL中は2フレーム前の出力を持ち回す
    prev_freeze_pose: Option<Pose>,
    stable_count: u32,
    prev_pose: Option<Pose>,
    baseline: Option<AnthropometricRatios>,
    frame_count: u64,
    last_known_good: LastKnownGood,
}

impl TrackState {
    /// 全フィールドを必ず初期化する（遅延バックフィルは行わない）
    fn new() -> Self {
        Self {
            state: FilterState::Normal,
            freeze_pose: None,
            prev_freeze_pose: None,
            stable_count: 0,
            prev_pose: None,
            baseline: None,
            frame_count: 0,
            last_known_good: LastKnownGood::new(),
        }
    }
}

/// ポーズ安定化フィルタ
///
/// トラック（ポーズスロット）ごとに独立した状態機械を持ち、
/// 1回の process() 呼び出しが1スロットの1フレームを同期的に処理する。
/// 同一スロットのフレームは時系列順に渡すこと（順序の乱れはエラーには
/// ならず、検出品質が静かに劣化するだけ）。
/// 設定は構築時に固定。閾値を変えたい場合は新しいインスタンスを作る
pub struct StabilityFilter {
    config: StabilityConfig,
    tracks: HashMap<usize, TrackState>,
}

impl StabilityFilter {
    pub fn new(config: StabilityConfig) -> Self {
        Self {
            config,
            tracks: HashMap::new(),
        }
    }

    pub fn config(&self) -> &StabilityConfig {
        &self.config
    }

    /// 全スロットの状態をクリアする（動画切り替え時など）
    pub fn reset(&mut self) {
        self.tracks.clear();
    }

    /// 1スロットのみクリアする
    pub fn reset_slot(&mut self, slot: usize) {
        self.tracks.remove(&slot);
    }

    /// 1スロットの1フレームを処理する
    ///
    /// 失敗しない設計: 不正な入力は破損扱いのリカバリ経路に流れるだけで、
    /// エラーにもpanicにもならない
    pub fn process(&mut self, slot: usize, raw: &Pose) -> FilterResult {
        let config = &self.config;
        let track = self.tracks.entry(slot).or_insert_with(TrackState::new);
        track.frame_count += 1;

        let mirroring = config.enable_mirror_recovery || config.mirror_only;

        // 関節消失（信頼度崩落）の処理: ミラー候補は対側反射、残りはキャッシュ
        let mut pose = raw.clone();
        if mirroring {
            let loss =
                detect_joint_loss(&pose, track.prev_pose.as_ref(), &track.last_known_good, config);
            if !loss.mirrorable.is_empty() {
                pose = mirror_pose(&pose, &loss.mirrorable);
            }
            if !loss.fallback.is_empty() {
                track.last_known_good.apply(&mut pose, &loss.fallback);
            }
        }

        if config.mirror_only {
            return Self::step_mirror_only(slot, config, track, pose);
        }

        match track.state {
            FilterState::Normal => Self::step_normal(slot, config, track, pose),
            FilterState::Recovery => Self::step_recovery(slot, config, track, pose),
        }
    }

    /// 体型ベースライン: 破損チェックを通過したフレームからのみ、
    /// 3フレーム目以降に一度だけ確立する。破損フレームを基準に取り込むと
    /// 以後の正常フレームがすべて比率逸脱扱いになり復帰不能になる
    fn capture_baseline(
        slot: usize,
        config: &StabilityConfig,
        track: &mut TrackState,
        pose: &Pose,
    ) {
        if track.baseline.is_some() || track.frame_count < 3 {
            return;
        }
        if let Some(ratios) = calculate_ratios(pose, config.min_confidence) {
            debug!(
                "slot {slot}: 体型ベースライン確立 (frame {}, shoulder_width={:.1})",
                track.frame_count, ratios.shoulder_width
            );
            track.baseline = Some(ratios);
        }
    }

    /// NORMAL: ライブ検出を信頼しつつ全身破損を監視する
    fn step_normal(
        slot: usize,
        config: &StabilityConfig,
        track: &mut TrackState,
        pose: Pose,
    ) -> FilterResult {
        let check = detect_banana(&pose, track.prev_pose.as_ref(), track.baseline.as_ref(), config);

        if !check.is_banana {
            Self::capture_baseline(slot, config, track, &pose);
            let output = match track.prev_pose.as_ref() {
                Some(prev) => smooth_pose(&pose, prev, config.smoothing_alpha),
                None => pose,
            };
            track.last_known_good.update(&output, config.min_confidence);
            track.prev_freeze_pose = track.prev_pose.replace(output.clone());
            return FilterResult {
                pose: output,
                state: FilterState::Normal,
                is_banana_frame: false,
                stable_count: track.stable_count,
                similarity: check.similarity,
            };
        }

        // 破損検出。まずは最小侵襲のミラー補正を試す（RECOVERYには入らない）
        if config.enable_mirror_recovery {
            if let Some(prev) = track.prev_pose.clone() {
                let map = localize_corruption(&pose, &prev, config);
                if map.can_mirror() {
                    let repaired = mirror_pose(&pose, &map.corrupted);
                    let output = smooth_pose(&repaired, &prev, config.smoothing_alpha);
                    track.last_known_good.update(&output, config.min_confidence);
                    track.prev_freeze_pose = track.prev_pose.replace(output.clone());
                    return FilterResult {
                        pose: output,
                        state: FilterState::Normal,
                        is_banana_frame: true,
                        stable_count: track.stable_count,
                        similarity: check.similarity,
                    };
                }
            }
        }

        // ミラー不能な全身破損 → フリーズしてリカバリへ
        debug!("slot {slot}: リカバリ開始 ({:?})", check.reason);
        track.state = FilterState::Recovery;
        let freeze = track.prev_pose.clone().unwrap_or_else(|| pose.clone());
        track.freeze_pose = Some(freeze);
        track.stable_count = 0;

        let output = Self::advance_frozen(config, track);
        track.last_known_good.update(&output, config.min_confidence);
        FilterResult {
            pose: output,
            state: FilterState::Recovery,
            is_banana_frame: true,
            stable_count: 0,
            similarity: check.similarity,
        }
    }

    /// RECOVERY: フリーズポーズと比較し、連続安定でNORMALに復帰する
    fn step_recovery(
        slot: usize,
        config: &StabilityConfig,
        track: &mut TrackState,
        pose: Pose,
    ) -> FilterResult {
        let freeze = match track.freeze_pose.clone() {
            Some(freeze) => freeze,
            // 不変条件上起こらないが、万一欠けていても落とさない
            None => pose.clone(),
        };

        let check = detect_banana(&pose, Some(&freeze), track.baseline.as_ref(), config);
        let similarity =
            cosine_similarity(&pose.keypoints, &freeze.keypoints, config.min_confidence);

        let stable = !check.is_banana && similarity > config.min_cosine_similarity;
        if stable {
            track.stable_count += 1;
        } else {
            track.stable_count = 0;
        }

        if track.stable_count >= config.recovery_frames {
            debug!("slot {slot}: リカバリ終了 ({}連続安定)", track.stable_count);
            let reported = track.stable_count;
            track.state = FilterState::Normal;
            track.freeze_pose = None;
            track.prev_freeze_pose = None;
            track.stable_count = 0;
            track.last_known_good.update(&pose, config.min_confidence);
            track.prev_pose = Some(pose.clone());
            return FilterResult {
                pose,
                state: FilterState::Normal,
                is_banana_frame: false,
                stable_count: reported,
                similarity: Some(similarity),
            };
        }

        // フリーズは進めずに、片側だけの破損ならミラー補正した現フレームを出す
        if config.enable_mirror_recovery {
            let map = localize_corruption(&pose, &freeze, config);
            if map.can_mirror() {
                let repaired = mirror_pose(&pose, &map.corrupted);
                track.last_known_good.update(&repaired, config.min_confidence);
                return FilterResult {
                    pose: repaired,
                    state: FilterState::Recovery,
                    is_banana_frame: check.is_banana,
                    stable_count: track.stable_count,
                    similarity: Some(similarity),
                };
            }
        }

        let output = Self::advance_frozen(config, track);
        track.last_known_good.update(&output, config.min_confidence);
        FilterResult {
            pose: output,
            state: FilterState::Recovery,
            is_banana_frame: check.is_banana,
            stable_count: track.stable_count,
            similarity: Some(similarity),
        }
    }

    /// ミラー専用モード: 状態機械を完全にバイパスする
    ///
    /// 関節消失処理と関節単位のミラー補正のみ毎フレーム実行し、
    /// フリーズ/リカバリは一切発生しない。補正できない破損は
    /// そのまま出力される（出力が止まらないことを優先する運用向け）
    fn step_mirror_only(
        slot: usize,
        config: &StabilityConfig,
        track: &mut TrackState,
        pose: Pose,
    ) -> FilterResult {
        let check = detect_banana(&pose, track.prev_pose.as_ref(), track.baseline.as_ref(), config);
        if !check.is_banana {
            Self::capture_baseline(slot, config, track, &pose);
        }

        let mut corrected = pose;
        if check.is_banana {
            if let Some(prev) = track.prev_pose.as_ref() {
                let map = localize_corruption(&corrected, prev, config);
                if map.can_mirror() {
                    corrected = mirror_pose(&corrected, &map.corrupted);
                }
            }
        }

        let output = match track.prev_pose.as_ref() {
            Some(prev) => smooth_pose(&corrected, prev, config.smoothing_alpha),
            None => corrected,
        };
        track.last_known_good.update(&output, config.min_confidence);
        track.prev_pose = Some(output.clone());
        FilterResult {
            pose: output,
            state: FilterState::Normal,
            is_banana_frame: check.is_banana,
            stable_count: 0,
            similarity: check.similarity,
        }
    }

    /// フリーズポーズを出力する。シミュレーション有効時は
    /// 慣性減衰で外挿し、フリーズ自体をその出力へ進める
    fn advance_frozen(config: &StabilityConfig, track: &mut TrackState) -> Pose {
        let freeze = match track.freeze_pose.clone() {
            Some(freeze) => freeze,
            None => return Pose::default(),
        };
        if !config.enable_simulation {
            return freeze;
        }
        let prev = track.prev_freeze_pose.clone().unwrap_or_else(|| freeze.clone());
        let simulated = simulate_pose(&freeze, &prev, config.simulation_decay);
        track.prev_freeze_pose = Some(freeze);
        track.freeze_pose = Some(simulated.clone());
        simulated
    }
}
