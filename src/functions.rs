// Named single-argument functions callable from ycalc expressions

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

pub type UnitFunction = Arc<dyn Fn(f64) -> f64 + Send + Sync>;

/// Upper wind speed (m/s) of Beaufort forces 0 to 11
const BEAUFORT_THRESHOLDS: [f64; 12] = [0.3, 1.5, 3.4, 5.4, 7.9, 10.7, 13.8, 17.1, 20.7, 24.4, 28.4, 32.6];

#[derive(Clone, Default)]
pub struct FunctionRegistry {
    functions: HashMap<String, UnitFunction>,
}

impl FunctionRegistry {
    /// A registry with no functions
    pub fn empty() -> Self {
        Self::default()
    }

    /// The standard unit conversions
    pub fn with_conversions() -> Self {
        let mut registry = Self::empty();
        // wind speeds are stored in m/s
        registry.register("wind_kmph", |ms| ms * 3.6);
        registry.register("wind_mph", |ms| ms * 3.6 / 1.609344);
        registry.register("wind_kn", |ms| ms * 3.6 / 1.852);
        registry.register("wind_bft", wind_bft);
        registry.register("winddir_degrees", |point| point * 22.5);
        registry.register("temp_f", |c| c * 9.0 / 5.0 + 32.0);
        registry.register("rain_inch", |mm| mm / 25.4);
        registry.register("pressure_inhg", |hpa| hpa * 0.02953);
        registry.register("abs", f64::abs);
        registry
    }

    /// Add or replace a function
    pub fn register<F>(&mut self, name: impl Into<String>, function: F)
    where
        F: Fn(f64) -> f64 + Send + Sync + 'static,
    {
        self.functions.insert(name.into(), Arc::new(function));
    }

    pub fn get(&self, name: &str) -> Option<&UnitFunction> {
        self.functions.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.functions.contains_key(name)
    }

    /// Registered names in sorted order
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.functions.keys().map(|k| k.as_str()).collect();
        names.sort_unstable();
        names
    }
}

impl fmt::Debug for FunctionRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FunctionRegistry")
            .field("functions", &self.names())
            .finish()
    }
}

/// Beaufort force for a wind speed in m/s
fn wind_bft(ms: f64) -> f64 {
    BEAUFORT_THRESHOLDS
        .iter()
        .position(|&limit| ms < limit)
        .unwrap_or(BEAUFORT_THRESHOLDS.len()) as f64
}
