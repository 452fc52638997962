use anyhow::Result;
use serde::Deserialize;
use std::fs;
use std::path::Path;

#[derive(Debug, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub stability: StabilityConfig,
}

/// 安定化フィルタの閾値・フラグ
///
/// 閾値は経験的に選ばれたもので、17キーポイント以外のトポロジーには
/// 最適とは限らない。フィルタ構築後は不変（変更は新規インスタンス作成で行う）
#[derive(Debug, Deserialize, Clone)]
pub struct StabilityConfig {
    /// セグメント長のフレーム間変化率の上限（1.25 = 25%伸縮まで許容）
    #[serde(default = "default_max_segment_change")]
    pub max_segment_change: f64,
    /// 関節角度のフレーム間変化の上限（度）
    #[serde(default = "default_max_angle_change")]
    pub max_angle_change_deg: f64,
    /// コサイン類似度の下限。下回ると破損扱い
    #[serde(default = "default_min_cosine_similarity")]
    pub min_cosine_similarity: f64,
    /// ベースライン比率からの許容偏差
    #[serde(default = "default_ratio_tolerance")]
    pub ratio_tolerance: f64,
    /// リカバリ終了に必要な連続安定フレーム数
    #[serde(default = "default_recovery_frames")]
    pub recovery_frames: u32,
    /// 関節を信頼する最低信頼度
    #[serde(default = "default_min_confidence")]
    pub min_confidence: f64,
    /// ミラー復元（対側反射による部分補正）を有効化
    #[serde(default = "default_enable_mirror_recovery")]
    pub enable_mirror_recovery: bool,
    /// フリーズ中の慣性減衰シミュレーションを有効化
    #[serde(default)]
    pub enable_simulation: bool,
    /// ミラー専用モード: フリーズ/リカバリを一切行わない
    #[serde(default)]
    pub mirror_only: bool,
    /// シミュレーションの速度減衰係数
    #[serde(default = "default_simulation_decay")]
    pub simulation_decay: f64,
    /// 位置EMA平滑化の係数
    #[serde(default = "default_smoothing_alpha")]
    pub smoothing_alpha: f64,
}

fn default_max_segment_change() -> f64 { 1.25 }
fn default_max_angle_change() -> f64 { 25.0 }
fn default_min_cosine_similarity() -> f64 { 0.8 }
fn default_ratio_tolerance() -> f64 { 0.35 }
fn default_recovery_frames() -> u32 { 4 }
fn default_min_confidence() -> f64 { 0.3 }
fn default_enable_mirror_recovery() -> bool { true }
fn default_simulation_decay() -> f64 { 0.9 }
fn default_smoothing_alpha() -> f64 { 0.7 }

impl Default for StabilityConfig {
    fn default() -> Self {
        Self {
            max_segment_change: default_max_segment_change(),
            max_angle_change_deg: default_max_angle_change(),
            min_cosine_similarity: default_min_cosine_similarity(),
            ratio_tolerance: default_ratio_tolerance(),
            recovery_frames: default_recovery_frames(),
            min_confidence: default_min_confidence(),
            enable_mirror_recovery: default_enable_mirror_recovery(),
            enable_simulation: false,
            mirror_only: false,
            simulation_decay: default_simulation_decay(),
            smoothing_alpha: default_smoothing_alpha(),
        }
    }
}

impl Config {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        Ok(config)
    }

    /// 設定ファイルがなければデフォルト値を使う
    pub fn load_or_default<P: AsRef<Path>>(path: P) -> Self {
        match Self::load(path) {
            Ok(config) => config,
            Err(e) => {
                log::warn!("設定ファイルを読み込めませんでした ({e})。デフォルト値を使用します");
                Self::default()
            }
        }
    }
}
