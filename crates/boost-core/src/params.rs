//! Named runtime parameters, read and written as text.
//!
//! These back the daemon's control socket:
//!
//! | name                   | read                  | write              |
//! |------------------------|-----------------------|--------------------|
//! | `input_boost_freq`     | `"0:v 1:v ...\n"`     | uniform or pairs   |
//! | `input_boost_ms`       | `"200\n"`             | integer >= 50      |
//! | `sched_boost_on_input` | `"Y\n"` / `"N\n"`     | `y/n/1/0/on/off`   |

use crate::tunables::{parse_bool, Tunables};
use boost_common::error::{BoostError, BoostResult};
use std::fmt;
use std::str::FromStr;

/// A tunable parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Param {
    /// Per-CPU boost frequencies.
    InputBoostFreq,
    /// Boost window in milliseconds.
    InputBoostMs,
    /// Scheduler boost during windows.
    SchedBoostOnInput,
}

impl Param {
    /// Every parameter, in display order.
    pub const ALL: [Param; 3] = [
        Param::InputBoostFreq,
        Param::InputBoostMs,
        Param::SchedBoostOnInput,
    ];

    /// Parameter name.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Param::InputBoostFreq => "input_boost_freq",
            Param::InputBoostMs => "input_boost_ms",
            Param::SchedBoostOnInput => "sched_boost_on_input",
        }
    }
}

impl fmt::Display for Param {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Param {
    type Err = BoostError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Param::ALL
            .into_iter()
            .find(|p| p.name() == s)
            .ok_or_else(|| BoostError::invalid(format!("unknown parameter {s:?}")))
    }
}

impl Tunables {
    /// Render `param` as its textual value.
    #[must_use]
    pub fn get_param(&self, param: Param) -> String {
        match param {
            Param::InputBoostFreq => self.boost_freq(),
            Param::InputBoostMs => format!("{}\n", self.window_ms()),
            Param::SchedBoostOnInput => {
                if self.sched_boost_on_input() { "Y\n" } else { "N\n" }.to_string()
            }
        }
    }

    /// Write `param` from text.
    ///
    /// # Errors
    ///
    /// [`BoostError::InvalidArgument`] if `value` is rejected; nothing changes.
    pub fn set_param(&self, param: Param, value: &str) -> BoostResult<()> {
        match param {
            Param::InputBoostFreq => self.set_boost_freq(value),
            Param::InputBoostMs => {
                let ms = value
                    .trim()
                    .parse()
                    .map_err(|_| BoostError::invalid(format!("invalid window {value:?}")))?;
                self.set_window_ms(ms)
            }
            Param::SchedBoostOnInput => {
                self.set_sched_boost_on_input(parse_bool(value)?);
                Ok(())
            }
        }
    }
}
