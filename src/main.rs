use std::time::{Duration, Instant};

use anyhow::{bail, Context};
use clap::Parser;
use embedded_hal::blocking::delay::DelayUs;
use rppal::spi::{Bus, Mode, SlaveSelect, Spi};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

use crate::{
    controller::LightController,
    driver::{sk9822::Sk9822, LedStrip, ThreadDelay},
    midi_in::{EventSource, PortSource, SerialSource},
    service::{FrameStats, Services},
    settings::{InputKind, Settings, StripSettings},
};

mod controller;
mod driver;
mod events;
mod keys;
mod leds;
mod mapping;
mod midi_in;
mod schedule;
mod service;
mod settings;

#[derive(Parser, Debug)]
#[clap(
    name = "keylight",
    version = env!("CARGO_PKG_VERSION"),
    about = "Lights an LED strip from live MIDI key presses",
)]
struct Args {
    #[clap(short, long, help = "Config file (TOML)")]
    config: Option<String>,

    #[clap(long, help = "List MIDI input ports and exit")]
    list_ports: bool,
}

/// Remembers whether a subsystem is failing so that a persistent error is
/// logged once, not on every iteration.
struct Health {
    what: &'static str,
    ok: bool,
}

impl Health {
    fn new(what: &'static str) -> Self {
        Self { what, ok: true }
    }

    /// Returns whether the state flipped.
    fn update<T, E: std::fmt::Debug>(&mut self, result: &Result<T, E>) -> bool {
        match result {
            Ok(_) if !self.ok => {
                info!("{} recovered", self.what);
                self.ok = true;
                true
            }
            Err(err) if self.ok => {
                warn!("{} failing: {err:?}", self.what);
                self.ok = false;
                true
            }
            _ => false,
        }
    }
}

fn open_strip(settings: &StripSettings, len: usize) -> anyhow::Result<Sk9822<Spi>> {
    let bus = match settings.spi_bus {
        0 => Bus::Spi0,
        1 => Bus::Spi1,
        2 => Bus::Spi2,
        3 => Bus::Spi3,
        4 => Bus::Spi4,
        5 => Bus::Spi5,
        6 => Bus::Spi6,
        other => bail!("no spi bus {other}"),
    };
    let slave_select = match settings.slave_select {
        0 => SlaveSelect::Ss0,
        1 => SlaveSelect::Ss1,
        2 => SlaveSelect::Ss2,
        other => bail!("no slave select {other}"),
    };

    let spi = Spi::new(bus, slave_select, settings.clock_hz, Mode::Mode0)
        .context("failed to open spi bus")?;
    debug!(
        "opened spi bus {} at {} Hz for {len} leds",
        settings.spi_bus, settings.clock_hz
    );

    Ok(Sk9822::new(spi, len))
}

fn open_source(settings: &Settings) -> anyhow::Result<Box<dyn EventSource>> {
    let input = &settings.input;
    Ok(match input.kind {
        InputKind::Serial => Box::new(SerialSource::open(&input.serial_path, input.baud_rate)?),
        InputKind::Port => Box::new(PortSource::connect(&input.client_name, &input.port_name)?),
    })
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .pretty()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let args = Args::parse();

    if args.list_ports {
        for name in midi_in::list_ports("keylight")? {
            println!("{name}");
        }
        return Ok(());
    }

    let settings = Settings::load(args.config.as_deref())?;
    debug!("running with settings {settings:?}");

    let ct = CancellationToken::new();
    let handler_ct = ct.clone();

    ctrlc::set_handler(move || {
        info!("received ctrl+c, exiting");
        handler_ct.cancel();
    })?;

    let mut strip = open_strip(&settings.strip, settings.layout.num_leds)?;
    strip.set_max_brightness(settings.max_brightness);

    let mut source = open_source(&settings)?;

    let start = Instant::now();
    let mut services = Services::new();
    services.push(FrameStats::new(
        Duration::from_secs(settings.stats_interval_s),
        start,
    ));
    services.begin_all();

    let mut controller =
        LightController::new(settings.layout, &settings.decay, settings.brightness, start);
    let mut delay = ThreadDelay;
    let mut source_health = Health::new("midi input");
    let mut strip_health = Health::new("strip");

    info!("lighting {} keys on {} leds", settings.layout.num_keys, strip.len());

    while !ct.is_cancelled() {
        services.service_all(Instant::now());

        source_health.update(&source.service(&mut controller));
        strip_health.update(&controller.frame(Instant::now(), &mut strip));

        delay.delay_us(settings.idle_us);
    }

    controller
        .blackout(&mut strip)
        .context("failed to blank strip")?;

    info!("exit");

    Ok(())
}
