// src/layers.rs - Layer classification, exposure schedule, time estimates
use crate::config::{LayerProfile, Settings};
use crate::print_data::LayerOverrides;

/// One extra video frame is always shown, so requested exposures are
/// shortened by this much before arming the timer.
pub const VIDEOFRAME_SEC: f64 = 1.0 / 60.0;

/// Fixed per-layer overhead assumed for separation and approach when
/// estimating remaining print time.
pub const SEPARATION_TIME_SEC: f64 = 6.0;

/// The three exposure classes a layer can fall into.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LayerType {
    First,
    BurnIn,
    Model,
}

/// Classify a 1-indexed layer given the configured burn-in count.
pub fn classify(current_layer: u32, burn_in_layers: u32) -> LayerType {
    if current_layer == 1 {
        LayerType::First
    } else if burn_in_layers > 0 && current_layer >= 2 && current_layer <= 1 + burn_in_layers {
        LayerType::BurnIn
    } else {
        LayerType::Model
    }
}

/// Read-only view joining the settings store with the per-print override
/// table; everything motion- or exposure-related about a specific layer is
/// answered here.
pub struct LayerSettings<'a> {
    settings: &'a Settings,
    overrides: &'a LayerOverrides,
}

/// The motion parameters for one specific layer, with overrides applied.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LayerMotion {
    pub separation_r_jerk: i32,
    pub separation_r_speed: i32,
    pub rotation_millidegrees: i32,
    pub separation_z_jerk: i32,
    pub separation_z_speed: i32,
    pub z_lift_microns: i32,
    pub approach_r_jerk: i32,
    pub approach_r_speed: i32,
    pub approach_z_jerk: i32,
    pub approach_z_speed: i32,
    pub thickness_microns: i32,
}

impl<'a> LayerSettings<'a> {
    pub fn new(settings: &'a Settings, overrides: &'a LayerOverrides) -> Self {
        Self {
            settings,
            overrides,
        }
    }

    pub fn classify(&self, layer: u32) -> LayerType {
        classify(layer, self.settings.exposure.burn_in_layers)
    }

    fn profile(&self, layer_type: LayerType) -> &LayerProfile {
        match layer_type {
            LayerType::First => &self.settings.first_layer,
            LayerType::BurnIn => &self.settings.burn_in_layer,
            LayerType::Model => &self.settings.model_layer,
        }
    }

    /// Resolve the motion parameters for `layer`, honoring any override row.
    pub fn motion(&self, layer_type: LayerType, layer: u32) -> LayerMotion {
        let p = self.profile(layer_type);
        let row = self.overrides.row(layer);
        LayerMotion {
            separation_r_jerk: p.separation_r_jerk,
            separation_r_speed: p.separation_r_speed,
            rotation_millidegrees: row
                .and_then(|r| r.rotation_millidegrees)
                .unwrap_or(p.rotation_millidegrees),
            separation_z_jerk: p.separation_z_jerk,
            separation_z_speed: p.separation_z_speed,
            z_lift_microns: row
                .and_then(|r| r.z_lift_microns)
                .unwrap_or(p.z_lift_microns),
            approach_r_jerk: p.approach_r_jerk,
            approach_r_speed: p.approach_r_speed,
            approach_z_jerk: p.approach_z_jerk,
            approach_z_speed: p.approach_z_speed,
            thickness_microns: row
                .and_then(|r| r.thickness_microns)
                .unwrap_or(self.settings.motor.layer_thickness),
        }
    }

    /// Requested exposure for `layer`, before the video-frame deduction.
    pub fn exposure_sec(&self, layer: u32) -> f64 {
        if let Some(row) = self.overrides.row(layer) {
            if let Some(sec) = row.exposure_sec {
                return sec;
            }
        }
        match self.classify(layer) {
            LayerType::First => self.settings.exposure.first_exposure_sec,
            LayerType::BurnIn => self.settings.exposure.burn_in_exposure_sec,
            LayerType::Model => self.settings.exposure.model_exposure_sec,
        }
    }

    /// The time actually armed on the exposure timer: one video frame is
    /// deducted whenever the request leaves room for it.
    pub fn timer_exposure_sec(&self, layer: u32) -> f64 {
        let requested = self.exposure_sec(layer);
        if requested > VIDEOFRAME_SEC {
            requested - VIDEOFRAME_SEC
        } else {
            requested
        }
    }
}

/// Estimated seconds to finish a print currently on `current_layer` of
/// `num_layers`: the remaining exposure schedule plus a fixed separation
/// overhead per remaining layer, rounded to the nearest second.
pub fn estimate_remaining_secs(settings: &Settings, current_layer: u32, num_layers: u32) -> u32 {
    if num_layers == 0 || current_layer == 0 || current_layer > num_layers {
        return 0;
    }
    let layers_left = (num_layers - (current_layer - 1)) as f64;
    let sep_times = layers_left * SEPARATION_TIME_SEC;

    let burn_in = settings.exposure.burn_in_layers as f64;
    let burn_in_exposure = settings.exposure.burn_in_exposure_sec;
    let model_exposure = settings.exposure.model_exposure_sec;

    let exp_times = match classify(current_layer, settings.exposure.burn_in_layers) {
        LayerType::First => {
            settings.exposure.first_exposure_sec
                + burn_in * burn_in_exposure
                + (num_layers as f64 - (burn_in + 1.0)) * model_exposure
        }
        LayerType::BurnIn => {
            let burn_in_left = burn_in - (current_layer as f64 - 2.0);
            let model_left = layers_left - burn_in_left;
            burn_in_left * burn_in_exposure + model_left * model_exposure
        }
        LayerType::Model => layers_left * model_exposure,
    };

    (exp_times + sep_times + 0.5) as u32
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::print_data::OverrideRow;

    fn test_settings() -> Settings {
        let mut settings = Settings::default();
        settings.exposure.first_exposure_sec = 2.0;
        settings.exposure.burn_in_exposure_sec = 1.5;
        settings.exposure.model_exposure_sec = 1.0;
        settings.exposure.burn_in_layers = 1;
        settings
    }

    #[test]
    fn classification_matches_the_oracle() {
        // oracle: layer 1 is First; 2..=1+B is BurnIn when B > 0; else Model
        for burn_in in 0..4u32 {
            for layer in 1..10u32 {
                let expected = if layer == 1 {
                    LayerType::First
                } else if burn_in > 0 && layer <= 1 + burn_in {
                    LayerType::BurnIn
                } else {
                    LayerType::Model
                };
                assert_eq!(classify(layer, burn_in), expected, "L{layer} B{burn_in}");
            }
        }
    }

    #[test]
    fn three_layer_print_classifies_first_burnin_model() {
        assert_eq!(classify(1, 1), LayerType::First);
        assert_eq!(classify(2, 1), LayerType::BurnIn);
        assert_eq!(classify(3, 1), LayerType::Model);
    }

    #[test]
    fn exposure_deducts_one_video_frame() {
        let settings = test_settings();
        let overrides = LayerOverrides::default();
        let ls = LayerSettings::new(&settings, &overrides);
        assert_eq!(ls.exposure_sec(1), 2.0);
        let armed = ls.timer_exposure_sec(1);
        assert!((armed - (2.0 - VIDEOFRAME_SEC)).abs() < 1e-9);
    }

    #[test]
    fn tiny_exposures_are_not_driven_negative() {
        let mut settings = test_settings();
        settings.exposure.first_exposure_sec = 0.01;
        let overrides = LayerOverrides::default();
        let ls = LayerSettings::new(&settings, &overrides);
        assert_eq!(ls.timer_exposure_sec(1), 0.01);
    }

    #[test]
    fn override_row_wins_over_profile() {
        let settings = test_settings();
        let mut overrides = LayerOverrides::default();
        overrides.insert(OverrideRow {
            layer: 2,
            thickness_microns: Some(50),
            exposure_sec: Some(9.0),
            rotation_millidegrees: None,
            z_lift_microns: Some(3000),
        });
        let ls = LayerSettings::new(&settings, &overrides);
        assert_eq!(ls.exposure_sec(2), 9.0);
        let motion = ls.motion(LayerType::BurnIn, 2);
        assert_eq!(motion.thickness_microns, 50);
        assert_eq!(motion.z_lift_microns, 3000);
        // rotation has no override, so the profile value holds
        assert_eq!(
            motion.rotation_millidegrees,
            settings.burn_in_layer.rotation_millidegrees
        );
    }

    #[test]
    fn estimate_covers_the_remaining_schedule() {
        let settings = test_settings();
        // at layer 1 of 3: 2.0 + 1*1.5 + 1*1.0 exposure + 3 separations
        let expected = (2.0 + 1.5 + 1.0 + 3.0 * SEPARATION_TIME_SEC + 0.5) as u32;
        assert_eq!(estimate_remaining_secs(&settings, 1, 3), expected);
        // at the burn-in layer, the first exposure no longer counts
        let expected = (1.5 + 1.0 + 2.0 * SEPARATION_TIME_SEC + 0.5) as u32;
        assert_eq!(estimate_remaining_secs(&settings, 2, 3), expected);
        // no print, no estimate
        assert_eq!(estimate_remaining_secs(&settings, 0, 0), 0);
    }
}
