use anyhow::Context;
use config::{Config, Environment, File};
use serde::Deserialize;
use thiserror::Error;

use crate::{
    controller::KeyLayout, mapping::BrightnessCurve, midi_in::MIDI_BAUD_RATE,
    schedule::DecayPolicy,
};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SettingsError {
    #[error("there must be at least two keys (found {0})")]
    TooFewKeys(usize),
    #[error("there must be at least one LED")]
    NoLeds,
    #[error("start_led {start_led} is past the end of a {num_leds} LED strip")]
    StartLed { start_led: usize, num_leds: usize },
    #[error("min_note {min} must not be above max_note {max}")]
    NoteRange { min: u8, max: u8 },
    #[error("MIDI notes should be 0 to 127")]
    NoteOutOfRange,
    #[error("max_brightness must be 1 to 255")]
    MaxBrightness,
    #[error("brightness curve needs 0 < floor <= ceiling and input_max > 0")]
    Curve,
    #[error("decay intervals must be non-zero")]
    DecayInterval,
    #[error("stats_interval_s must be non-zero")]
    StatsInterval,
    #[error("{0} must not be empty")]
    Empty(&'static str),
    #[error("unsupported spi bus {bus} / slave select {slave_select}")]
    Spi { bus: u8, slave_select: u8 },
}

#[derive(Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum InputKind {
    /// A UART wired to a DIN MIDI socket
    Serial,
    /// A system MIDI port, matched by name
    Port,
}

#[derive(Deserialize, Debug, Clone)]
#[serde(default)]
pub struct InputSettings {
    pub kind: InputKind,
    pub serial_path: String,
    /// The Pi's UART cannot always hit 31250 exactly; a common workaround is
    /// to retune the UART clock and ask for 38400 here.
    pub baud_rate: u32,
    pub client_name: String,
    /// Substring of the port name to connect to.
    pub port_name: String,
}

impl Default for InputSettings {
    fn default() -> Self {
        Self {
            kind: InputKind::Serial,
            serial_path: "/dev/serial0".to_string(),
            baud_rate: MIDI_BAUD_RATE,
            client_name: "keylight".to_string(),
            port_name: "".to_string(),
        }
    }
}

#[derive(Deserialize, Debug, Clone, Copy)]
#[serde(default)]
pub struct StripSettings {
    pub spi_bus: u8,
    pub slave_select: u8,
    pub clock_hz: u32,
}

impl Default for StripSettings {
    fn default() -> Self {
        Self {
            spi_bus: 0,
            slave_select: 0,
            clock_hz: 8_000_000,
        }
    }
}

#[derive(Deserialize, Debug, Clone)]
#[serde(default)]
pub struct Settings {
    pub layout: KeyLayout,
    pub decay: DecayPolicy,
    pub brightness: BrightnessCurve,
    /// Global limiter applied by the strip driver, 1 to 255.
    pub max_brightness: u8,
    pub input: InputSettings,
    pub strip: StripSettings,
    /// Sleep at the end of every loop iteration. Keep it well under the
    /// shortest decay interval.
    pub idle_us: u32,
    /// How often the loop rate is logged, in seconds.
    pub stats_interval_s: u64,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            layout: KeyLayout::default(),
            decay: DecayPolicy::default(),
            brightness: BrightnessCurve::default(),
            max_brightness: 180,
            input: InputSettings::default(),
            strip: StripSettings::default(),
            idle_us: 500,
            stats_interval_s: 5,
        }
    }
}

impl Settings {
    /// Defaults, overridden by the optional config file, overridden by
    /// `KEYLIGHT_*` environment variables (`KEYLIGHT_LAYOUT__NUM_KEYS=88`).
    pub fn load(path: Option<&str>) -> anyhow::Result<Self> {
        let mut cfg = Config::builder();
        if let Some(path) = path {
            cfg = cfg.add_source(File::with_name(path));
        }
        cfg = cfg.add_source(
            Environment::with_prefix("KEYLIGHT")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

        let settings: Settings = cfg
            .build()
            .context("failed to read settings")?
            .try_deserialize()
            .context("failed to parse settings")?;
        settings.validate()?;

        Ok(settings)
    }

    pub fn validate(&self) -> Result<(), SettingsError> {
        let layout = &self.layout;

        if layout.num_keys < 2 {
            return Err(SettingsError::TooFewKeys(layout.num_keys));
        }

        if layout.num_leds == 0 {
            return Err(SettingsError::NoLeds);
        }

        if layout.start_led >= layout.num_leds {
            return Err(SettingsError::StartLed {
                start_led: layout.start_led,
                num_leds: layout.num_leds,
            });
        }

        if layout.min_note >= 128 || layout.max_note >= 128 {
            return Err(SettingsError::NoteOutOfRange);
        }

        if layout.min_note > layout.max_note {
            return Err(SettingsError::NoteRange {
                min: layout.min_note,
                max: layout.max_note,
            });
        }

        if self.max_brightness == 0 {
            return Err(SettingsError::MaxBrightness);
        }

        let curve = &self.brightness;
        if curve.floor == 0 || curve.floor > curve.ceiling || curve.input_max == 0 {
            return Err(SettingsError::Curve);
        }

        let decay = &self.decay;
        if decay.sustained_blur_ms == 0 || decay.hue_shift_ms == 0 || decay.released_blur_ms == 0 {
            return Err(SettingsError::DecayInterval);
        }

        if self.stats_interval_s == 0 {
            return Err(SettingsError::StatsInterval);
        }

        match self.input.kind {
            InputKind::Serial if self.input.serial_path.is_empty() => {
                return Err(SettingsError::Empty("serial_path"))
            }
            InputKind::Port if self.input.port_name.is_empty() => {
                return Err(SettingsError::Empty("port_name"))
            }
            _ => {}
        }

        if self.input.client_name.is_empty() {
            return Err(SettingsError::Empty("client_name"));
        }

        if self.strip.spi_bus > 6 || self.strip.slave_select > 2 {
            return Err(SettingsError::Spi {
                bus: self.strip.spi_bus,
                slave_select: self.strip.slave_select,
            });
        }

        Ok(())
    }
}

#[cfg(test)]
mod test {
    use config::{Config, File, FileFormat};

    use super::*;

    fn parse(toml: &str) -> Settings {
        Config::builder()
            .add_source(File::from_str(toml, FileFormat::Toml))
            .build()
            .unwrap()
            .try_deserialize()
            .unwrap()
    }

    #[test]
    fn defaults_are_valid() {
        let settings = Settings::default();
        assert_eq!(settings.validate(), Ok(()));
        assert_eq!(settings.layout.num_keys, 76);
        assert_eq!(settings.layout.num_leds, 64);
        assert_eq!(settings.layout.min_note, 28);
        assert_eq!(settings.layout.max_note, 116);
        assert_eq!(settings.max_brightness, 180);
        assert_eq!(settings.decay, DecayPolicy::default());
    }

    #[test]
    fn partial_file_keeps_defaults() {
        let settings = parse(
            r#"
            max_brightness = 90

            [layout]
            num_keys = 88
            min_note = 21

            [input]
            kind = "port"
            port_name = "USB MIDI"
            "#,
        );

        assert_eq!(settings.max_brightness, 90);
        assert_eq!(settings.layout.num_keys, 88);
        assert_eq!(settings.layout.min_note, 21);
        assert_eq!(settings.layout.max_note, 116);
        assert_eq!(settings.layout.num_leds, 64);
        assert_eq!(settings.input.kind, InputKind::Port);
        assert_eq!(settings.input.port_name, "USB MIDI");
        assert_eq!(settings.decay.released_blur_ms, 6);
        assert_eq!(settings.validate(), Ok(()));
    }

    #[test]
    fn rejects_bad_layouts() {
        let mut settings = Settings::default();
        settings.layout.num_keys = 1;
        assert_eq!(settings.validate(), Err(SettingsError::TooFewKeys(1)));

        let mut settings = Settings::default();
        settings.layout.start_led = 64;
        assert!(matches!(settings.validate(), Err(SettingsError::StartLed { .. })));

        let mut settings = Settings::default();
        settings.layout.min_note = 100;
        settings.layout.max_note = 90;
        assert!(matches!(settings.validate(), Err(SettingsError::NoteRange { .. })));

        let mut settings = Settings::default();
        settings.layout.max_note = 128;
        assert_eq!(settings.validate(), Err(SettingsError::NoteOutOfRange));
    }

    #[test]
    fn rejects_bad_output_settings() {
        let mut settings = Settings::default();
        settings.max_brightness = 0;
        assert_eq!(settings.validate(), Err(SettingsError::MaxBrightness));

        let mut settings = Settings::default();
        settings.brightness.floor = 0;
        assert_eq!(settings.validate(), Err(SettingsError::Curve));

        let mut settings = Settings::default();
        settings.decay.released_blur_ms = 0;
        assert_eq!(settings.validate(), Err(SettingsError::DecayInterval));

        let mut settings = Settings::default();
        settings.strip.spi_bus = 7;
        assert!(matches!(settings.validate(), Err(SettingsError::Spi { .. })));
    }

    #[test]
    fn rejects_zero_stats_interval() {
        let settings = parse("stats_interval_s = 0");
        assert_eq!(settings.validate(), Err(SettingsError::StatsInterval));
    }

    #[test]
    fn port_input_needs_a_name() {
        let mut settings = Settings::default();
        settings.input.kind = InputKind::Port;
        assert_eq!(settings.validate(), Err(SettingsError::Empty("port_name")));
    }
}
