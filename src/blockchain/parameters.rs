use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Minimum number of `:`-separated values in a block zero `Parameters` line.
const BLOCK_FIELD_MIN_VALUES: usize = 17;

#[derive(Debug, Error, PartialEq)]
pub enum ParametersError {
    #[error("`{field}` must be a non-negative integer, got {value}")]
    Negative { field: &'static str, value: i64 },

    #[error("`{field}` must be a fraction in [0, 1], got {value}")]
    FractionOutOfRange { field: &'static str, value: f64 },

    #[error("malformed parameters field: {0}")]
    Malformed(String),
}

/// Consensus constants of a currency, read once from block zero.
///
/// Only built through [`TryFrom<RemoteParameters>`] or
/// [`BlockchainParameters::from_block_field`], both of which validate ranges.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct BlockchainParameters {
    /// Growth of the dividend every `dt` period.
    pub c: f64,
    /// Seconds between two dividends.
    pub dt: u64,
    /// Initial universal dividend.
    pub ud0: u64,
    /// Minimum delay between two certifications from the same issuer.
    pub sig_period: u64,
    /// Maximum active certifications issued by a member.
    pub sig_stock: u64,
    /// Maximum wait of a certification in the pool.
    pub sig_window: u64,
    /// Maximum age of an active certification.
    pub sig_validity: u64,
    /// Certifications required to join the WoT.
    pub sig_qty: u64,
    pub idty_window: u64,
    pub ms_window: u64,
    /// Share of sentries a newcomer must reach within `step_max`.
    pub xpercent: f64,
    /// Maximum age of an active membership.
    pub ms_validity: u64,
    /// Maximum WoT distance to a newcomer.
    pub step_max: u64,
    pub median_time_blocks: u64,
    /// Wished seconds per block.
    pub avg_gen_time: u64,
    /// Blocks between two PoWMin reevaluations.
    pub dt_diff_eval: u64,
    pub blocks_rot: u64,
    pub percent_rot: f64,
    pub ud_time0: u64,
    pub ud_reeval_time0: u64,
    pub dt_reeval: u64,
}

/// Parameters as served by the node, before validation.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteParameters {
    pub c: f64,
    pub dt: i64,
    pub ud0: i64,
    pub sig_period: i64,
    pub sig_stock: i64,
    pub sig_window: i64,
    pub sig_validity: i64,
    pub sig_qty: i64,
    #[serde(default)]
    pub idty_window: i64,
    #[serde(default)]
    pub ms_window: i64,
    pub xpercent: f64,
    pub ms_validity: i64,
    pub step_max: i64,
    pub median_time_blocks: i64,
    pub avg_gen_time: i64,
    pub dt_diff_eval: i64,
    #[serde(default)]
    pub blocks_rot: i64,
    pub percent_rot: f64,
    #[serde(default)]
    pub ud_time0: i64,
    #[serde(default)]
    pub ud_reeval_time0: i64,
    #[serde(default)]
    pub dt_reeval: i64,
}

impl TryFrom<RemoteParameters> for BlockchainParameters {
    type Error = ParametersError;

    fn try_from(p: RemoteParameters) -> Result<Self, Self::Error> {
        Ok(Self {
            c: fraction("c", p.c)?,
            dt: non_negative("dt", p.dt)?,
            ud0: non_negative("ud0", p.ud0)?,
            sig_period: non_negative("sigPeriod", p.sig_period)?,
            sig_stock: non_negative("sigStock", p.sig_stock)?,
            sig_window: non_negative("sigWindow", p.sig_window)?,
            sig_validity: non_negative("sigValidity", p.sig_validity)?,
            sig_qty: non_negative("sigQty", p.sig_qty)?,
            idty_window: non_negative("idtyWindow", p.idty_window)?,
            ms_window: non_negative("msWindow", p.ms_window)?,
            xpercent: fraction("xpercent", p.xpercent)?,
            ms_validity: non_negative("msValidity", p.ms_validity)?,
            step_max: non_negative("stepMax", p.step_max)?,
            median_time_blocks: non_negative("medianTimeBlocks", p.median_time_blocks)?,
            avg_gen_time: non_negative("avgGenTime", p.avg_gen_time)?,
            dt_diff_eval: non_negative("dtDiffEval", p.dt_diff_eval)?,
            blocks_rot: non_negative("blocksRot", p.blocks_rot)?,
            percent_rot: fraction("percentRot", p.percent_rot)?,
            ud_time0: non_negative("udTime0", p.ud_time0)?,
            ud_reeval_time0: non_negative("udReevalTime0", p.ud_reeval_time0)?,
            dt_reeval: non_negative("dtReeval", p.dt_reeval)?,
        })
    }
}

impl BlockchainParameters {
    /// Parse the `Parameters` line of block zero:
    /// `c:dt:ud0:sigPeriod:sigStock:sigWindow:sigValidity:sigQty:idtyWindow:msWindow:
    /// xpercent:msValidity:stepMax:medianTimeBlocks:avgGenTime:dtDiffEval:percentRot
    /// [:udTime0:udReevalTime0:dtReeval]`.
    pub fn from_block_field(value: &str) -> Result<Self, ParametersError> {
        let parts: Vec<&str> = value.split(':').collect();
        if parts.len() < BLOCK_FIELD_MIN_VALUES {
            return Err(ParametersError::Malformed(value.to_string()));
        }
        let float = |i: usize| -> Result<f64, ParametersError> {
            parts[i]
                .parse()
                .map_err(|_| ParametersError::Malformed(value.to_string()))
        };
        let int = |i: usize| -> Result<i64, ParametersError> {
            match parts.get(i) {
                Some(part) => part
                    .parse()
                    .map_err(|_| ParametersError::Malformed(value.to_string())),
                None => Ok(0),
            }
        };

        RemoteParameters {
            c: float(0)?,
            dt: int(1)?,
            ud0: int(2)?,
            sig_period: int(3)?,
            sig_stock: int(4)?,
            sig_window: int(5)?,
            sig_validity: int(6)?,
            sig_qty: int(7)?,
            idty_window: int(8)?,
            ms_window: int(9)?,
            xpercent: float(10)?,
            ms_validity: int(11)?,
            step_max: int(12)?,
            median_time_blocks: int(13)?,
            avg_gen_time: int(14)?,
            dt_diff_eval: int(15)?,
            blocks_rot: 0,
            percent_rot: float(16)?,
            ud_time0: int(17)?,
            ud_reeval_time0: int(18)?,
            dt_reeval: int(19)?,
        }
        .try_into()
    }
}

fn non_negative(field: &'static str, value: i64) -> Result<u64, ParametersError> {
    u64::try_from(value).map_err(|_| ParametersError::Negative { field, value })
}

fn fraction(field: &'static str, value: f64) -> Result<f64, ParametersError> {
    if value.is_finite() && (0.0..=1.0).contains(&value) {
        Ok(value)
    } else {
        Err(ParametersError::FractionOutOfRange { field, value })
    }
}
