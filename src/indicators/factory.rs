//! Tagged-sum factory: maps a declared indicator type tag plus its
//! parameter table to a concrete [`Ind`] variant. This is the single seam
//! the Feature Spec compiler (C5) goes through to instantiate indicators
//! named in a Play — it never constructs a concrete indicator struct
//! directly.

use std::collections::BTreeMap;

use thiserror::Error;

use super::{
    adaptive, buffer_based, core, ema_composable, lookback, stateful, trivial, volume, Ind,
};

/// Parameters for one indicator instance, as declared in a Play's feature
/// spec. Numeric params (periods, multipliers) and the one enum-valued
/// param (`Vwap`'s anchor mode) are kept separate so neither has to be
/// string-encoded.
#[derive(Debug, Clone, Default)]
pub struct IndicatorParams {
    numeric: BTreeMap<String, f64>,
    text: BTreeMap<String, String>,
}

impl IndicatorParams {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_numeric(mut self, key: &str, value: f64) -> Self {
        self.numeric.insert(key.to_string(), value);
        self
    }

    pub fn with_text(mut self, key: &str, value: &str) -> Self {
        self.text.insert(key.to_string(), value.to_string());
        self
    }

    fn usize(&self, indicator: &str, key: &str) -> Result<usize, FactoryError> {
        let v = self.f64(indicator, key)?;
        if v < 1.0 || v.fract() != 0.0 {
            return Err(FactoryError::InvalidParam {
                indicator: indicator.to_string(),
                param: key.to_string(),
                reason: format!("expected a positive integer, got {v}"),
            });
        }
        Ok(v as usize)
    }

    fn f64(&self, indicator: &str, key: &str) -> Result<f64, FactoryError> {
        self.numeric.get(key).copied().ok_or_else(|| FactoryError::MissingParam {
            indicator: indicator.to_string(),
            param: key.to_string(),
        })
    }

    fn f64_or(&self, key: &str, default: f64) -> f64 {
        self.numeric.get(key).copied().unwrap_or(default)
    }

    fn text(&self, indicator: &str, key: &str) -> Result<&str, FactoryError> {
        self.text.get(key).map(String::as_str).ok_or_else(|| FactoryError::MissingParam {
            indicator: indicator.to_string(),
            param: key.to_string(),
        })
    }
}

#[derive(Debug, Error)]
pub enum FactoryError {
    #[error("unknown indicator type `{0}`")]
    UnknownIndicatorType(String),
    #[error("indicator `{indicator}` is missing required parameter `{param}`")]
    MissingParam { indicator: String, param: String },
    #[error("indicator `{indicator}` parameter `{param}` is invalid: {reason}")]
    InvalidParam { indicator: String, param: String, reason: String },
}

/// Builds a concrete indicator from its declared type tag and parameter
/// table. Every branch reads its own params explicitly — there is no
/// fallback to a hard-coded default, matching the no-silent-defaults rule
/// that governs Play compilation generally (SPEC_FULL.md §4.7).
pub fn build_indicator(indicator_type: &str, p: &IndicatorParams) -> Result<Ind, FactoryError> {
    let t = indicator_type;
    Ok(match t {
        "ema" => Ind::Ema(core::Ema::new(p.usize(t, "period")?)),
        "sma" => Ind::Sma(core::Sma::new(p.usize(t, "period")?)),
        "rsi" => Ind::Rsi(core::Rsi::new(p.usize(t, "period")?)),
        "atr" => Ind::Atr(core::Atr::new(p.usize(t, "period")?)),
        "macd" => Ind::Macd(core::Macd::new(
            p.usize(t, "fast")?,
            p.usize(t, "slow")?,
            p.usize(t, "signal")?,
        )),
        "bbands" => Ind::BBands(core::BBands::new(p.usize(t, "period")?, p.f64(t, "k")?)),
        "williams_r" => Ind::WilliamsR(core::WilliamsR::new(p.usize(t, "period")?)),
        "cci" => Ind::Cci(core::Cci::new(p.usize(t, "period")?)),
        "stochastic" => Ind::Stochastic(core::Stochastic::new(
            p.usize(t, "k_period")?,
            p.usize(t, "d_period")?,
        )),
        "stoch_rsi" => Ind::StochRsi(core::StochRsi::new(
            p.usize(t, "rsi_period")?,
            p.usize(t, "stoch_period")?,
        )),
        "adx" => Ind::Adx(core::Adx::new(p.usize(t, "period")?)),
        "supertrend" => {
            Ind::SuperTrend(core::SuperTrend::new(p.usize(t, "period")?, p.f64(t, "multiplier")?))
        }
        "ohlc4" => Ind::Ohlc4(trivial::Ohlc4::default()),
        "midprice" => Ind::Midprice(trivial::Midprice::new(p.usize(t, "period")?)),
        "roc" => Ind::Roc(trivial::Roc::new(p.usize(t, "period")?)),
        "mom" => Ind::Mom(trivial::Mom::new(p.usize(t, "period")?)),
        "obv" => Ind::Obv(trivial::Obv::default()),
        "natr" => Ind::Natr(trivial::Natr::new(p.usize(t, "period")?)),
        "dema" => Ind::Dema(ema_composable::Dema::new(p.usize(t, "period")?)),
        "tema" => Ind::Tema(ema_composable::Tema::new(p.usize(t, "period")?)),
        "ppo" => Ind::Ppo(ema_composable::Ppo::new(
            p.usize(t, "fast")?,
            p.usize(t, "slow")?,
            p.usize(t, "signal")?,
        )),
        "trix" => Ind::Trix(ema_composable::Trix::new(p.usize(t, "period")?)),
        "tsi" => Ind::Tsi(ema_composable::Tsi::new(p.usize(t, "long")?, p.usize(t, "short")?)),
        "wma" => Ind::Wma(buffer_based::Wma::new(p.usize(t, "period")?)),
        "trima" => Ind::Trima(buffer_based::Trima::new(p.usize(t, "period")?)),
        "linreg" => Ind::LinReg(buffer_based::LinReg::new(p.usize(t, "period")?)),
        "cmf" => Ind::Cmf(buffer_based::Cmf::new(p.usize(t, "period")?)),
        "cmo" => Ind::Cmo(buffer_based::Cmo::new(p.usize(t, "period")?)),
        "mfi" => Ind::Mfi(buffer_based::Mfi::new(p.usize(t, "period")?)),
        "aroon" => Ind::Aroon(lookback::Aroon::new(p.usize(t, "length")?)),
        "donchian" => Ind::Donchian(lookback::Donchian::new(p.usize(t, "period")?)),
        "kc" => Ind::Kc(lookback::Kc::new(p.usize(t, "period")?, p.f64(t, "multiplier")?)),
        "dm" => Ind::Dm(lookback::Dm::new(p.usize(t, "length")?)),
        "vortex" => Ind::Vortex(lookback::Vortex::new(p.usize(t, "period")?)),
        "kama" => Ind::Kama(adaptive::Kama::new(
            p.usize(t, "period")?,
            p.usize(t, "fast")?,
            p.usize(t, "slow")?,
        )),
        "alma" => Ind::Alma(adaptive::Alma::new(
            p.usize(t, "period")?,
            p.f64_or("offset", 0.85),
            p.f64_or("sigma", 6.0),
        )),
        "zlma" => Ind::Zlma(adaptive::Zlma::new(p.usize(t, "period")?)),
        "uo" => Ind::Uo(adaptive::Uo::new(
            p.usize(t, "short")?,
            p.usize(t, "medium")?,
            p.usize(t, "long")?,
        )),
        "psar" => Ind::Psar(stateful::Psar::new(
            p.f64_or("af_step", 0.02),
            p.f64_or("af_max", 0.2),
        )),
        "squeeze" => Ind::Squeeze(stateful::Squeeze::new(
            p.usize(t, "period")?,
            p.f64_or("bb_mult", 2.0),
            p.f64_or("kc_mult", 1.5),
        )),
        "fisher" => Ind::Fisher(stateful::Fisher::new(p.usize(t, "period")?)),
        "kvo" => Ind::Kvo(volume::Kvo::new(
            p.usize(t, "short")?,
            p.usize(t, "long")?,
            p.usize(t, "signal")?,
        )),
        "vwap" => {
            let anchor = match p.text(t, "anchor")? {
                "daily" => volume::VwapAnchor::Daily,
                "weekly" => volume::VwapAnchor::Weekly,
                "none" => volume::VwapAnchor::None,
                other => {
                    return Err(FactoryError::InvalidParam {
                        indicator: t.to_string(),
                        param: "anchor".to_string(),
                        reason: format!("expected `daily`, `weekly`, or `none`, got `{other}`"),
                    })
                }
            };
            Ind::Vwap(volume::Vwap::new(anchor))
        }
        "anchored_vwap" => Ind::AnchoredVwap(volume::AnchoredVwap::new()),
        other => return Err(FactoryError::UnknownIndicatorType(other.to_string())),
    })
}
