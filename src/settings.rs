use crate::error::{Error, Result};

/// Analysis settings shared by every fault-tree and event-tree analysis.
///
/// Setters validate their input and can be chained:
/// ```
/// # use cutset::Settings;
/// let settings = Settings::new().set_limit_order(4).unwrap();
/// assert_eq!(settings.limit_order(), 4);
/// ```
#[derive(Debug, Clone)]
pub struct Settings {
    limit_order: usize,
    probability_analysis: bool,
    uncertainty_analysis: bool,
    mission_time: f64,
}

impl Settings {
    /// Returns settings with the default cut-set order limit of 20
    /// and a mission time of one year in hours.
    pub fn new() -> Settings {
        Settings {
            limit_order: 20,
            probability_analysis: false,
            uncertainty_analysis: false,
            mission_time: 8760.0,
        }
    }

    /// Sets the upper bound on the size of generated cut sets.
    ///
    /// `limit_order` must be positive.
    pub fn set_limit_order(mut self, limit_order: usize) -> Result<Settings> {
        if limit_order == 0 {
            return Err(Error::InvalidSettings(
                "limit_order must be positive".into(),
            ));
        }
        self.limit_order = limit_order;
        Ok(self)
    }

    /// Requests probability calculations from downstream consumers.
    pub fn set_probability_analysis(mut self, flag: bool) -> Settings {
        self.probability_analysis = flag;
        self
    }

    /// Requests uncertainty calculations from downstream consumers.
    /// Implies probability analysis.
    pub fn set_uncertainty_analysis(mut self, flag: bool) -> Settings {
        self.uncertainty_analysis = flag;
        if flag {
            self.probability_analysis = true;
        }
        self
    }

    /// Sets the system mission time in hours.
    ///
    /// `mission_time` must be positive.
    pub fn set_mission_time(mut self, mission_time: f64) -> Result<Settings> {
        if !(mission_time > 0.0) {
            return Err(Error::InvalidSettings(
                "mission_time must be positive".into(),
            ));
        }
        self.mission_time = mission_time;
        Ok(self)
    }

    pub fn limit_order(&self) -> usize {
        self.limit_order
    }

    pub fn probability_analysis(&self) -> bool {
        self.probability_analysis
    }

    pub fn uncertainty_analysis(&self) -> bool {
        self.uncertainty_analysis
    }

    pub fn mission_time(&self) -> f64 {
        self.mission_time
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_setter_validation() {
        assert!(Settings::new().set_limit_order(0).is_err());
        assert!(Settings::new().set_mission_time(0.0).is_err());
        assert!(Settings::new().set_mission_time(-1.0).is_err());

        let settings = Settings::new().set_limit_order(3).unwrap();
        assert_eq!(settings.limit_order(), 3);
    }

    #[test]
    fn test_uncertainty_implies_probability() {
        let settings = Settings::new().set_uncertainty_analysis(true);
        assert!(settings.probability_analysis());
    }
}
