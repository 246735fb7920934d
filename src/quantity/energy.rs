use std::fmt::{Display, Formatter};

use crate::quantity::Quantity;

pub type KilowattHours = Quantity<1, 1>;

impl KilowattHours {
    /// Whole watt-hours, truncated towards zero.
    #[must_use]
    #[expect(clippy::cast_possible_truncation)]
    pub fn watt_hours(self) -> i64 {
        (self.0 * 1000.0) as i64
    }
}

impl Display for KilowattHours {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:.2} kWh", self.0)
    }
}
