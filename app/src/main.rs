#![no_main]
#![no_std]

use core::fmt::Write;
use core::sync::atomic::{AtomicU32, Ordering};
use cortex_m;
use cortex_m_rt::{entry, exception};
use panic_halt as _;

use stm32f0xx_hal as hal;

use touchsense::tsc::{Channel, MaxCount, Tsc, TscChannel, TscSource};
use touchsense::{
    BenchmarkFilter, Calibration, ChannelConfig, ChannelSelect, DataKind, FilterMode, Polarity,
    ScanMode, TouchConfig, TouchSensor, DEFAULT_TOUCH_CONFIG,
};

use crate::hal::pac;
use crate::hal::prelude::*;

mod serial;

const PADS: usize = 7;
/// Pad left running in sleep
const WAKE_PAD: u8 = 3;
/// SysTick runs at 100Hz
const SCAN_PERIOD_TICKS: u32 = 4;
const MAX_COUNT: MaxCount = MaxCount::U8191;

// Two rows of three pads plus a single stop pad. Rows share groups, so the
// source splits each scan into two acquisitions.
static PAD_CHANNELS: [TscChannel; PADS] = [
    TscChannel { sense: Channel::G1Ch1, sample: Channel::G1Ch2 }, // Rev 1
    TscChannel { sense: Channel::G2Ch1, sample: Channel::G2Ch3 }, // Rev 2
    TscChannel { sense: Channel::G3Ch2, sample: Channel::G3Ch4 }, // Rev 3
    TscChannel { sense: Channel::G6Ch1, sample: Channel::G6Ch2 }, // Stop
    TscChannel { sense: Channel::G6Ch3, sample: Channel::G6Ch2 }, // Fwd 1
    TscChannel { sense: Channel::G2Ch2, sample: Channel::G2Ch3 }, // Fwd 2
    TscChannel { sense: Channel::G3Ch3, sample: Channel::G3Ch4 }, // Fwd 3
];

static TOUCH_CONFIG: TouchConfig = TouchConfig {
    filter_mode: FilterMode::Level(2),
    benchmark_filter: BenchmarkFilter::Iir16,
    denoise_level: 2,
    channel: ChannelConfig::new(100, 5, 3),
    // TSC counts drop when touched
    polarity: Polarity::Falling,
    calibration: Calibration {
        delay: 10,
        samples: 10,
    },
    timeout: Some(8191),
    ..DEFAULT_TOUCH_CONFIG
};

type Sensor = TouchSensor<TscSource<PADS>, PADS>;

static TIME: AtomicU32 = AtomicU32::new(0);

fn setup_touch() -> touchsense::Result<Sensor> {
    let tsc = Tsc::new(Some(touchsense::tsc::Config {
        clock_prescale: None,
        max_count: Some(MAX_COUNT),
        charge_transfer_high: None,
        charge_transfer_low: None,
    }));
    let source = TscSource::new(tsc, PAD_CHANNELS)?;
    let mut touch: Sensor = TouchSensor::new(source, TOUCH_CONFIG)?;

    for pad in 0..PADS as u8 {
        touch.enable_channel(pad)?;
    }
    // The stop pad is larger and sits under a thicker overlay
    touch.configure_channel(WAKE_PAD, 60, 5, 2)?;
    touch.configure_proximity(WAKE_PAD, 25, 0.5)?;
    touch.configure_sleep_channel(WAKE_PAD, 40, true)?;
    touch.start(ScanMode::OneShot)?;
    Ok(touch)
}

fn print_readings(touch: &Sensor, out: &mut serial::console::Console) {
    for pad in 0..PADS as u8 {
        let raw = touch.read(pad, DataKind::Raw).ok().flatten();
        let benchmark = touch.read(pad, DataKind::Benchmark).ok().flatten();
        let smooth = touch.read(pad, DataKind::Smooth).ok().flatten();
        let _ = write!(
            out,
            "PAD{} raw {:?} bench {:?} smooth {:?}\r\n",
            pad, raw, benchmark, smooth
        );
    }
}

fn handle_command(touch: &mut Sensor, cmd: u8, out: &mut serial::console::Console) {
    let result = match cmd {
        b's' => touch.enter_sleep(),
        b'w' => touch.exit_sleep(),
        b'r' => touch.reset_benchmark(ChannelSelect::All),
        b'p' => {
            print_readings(touch, out);
            Ok(())
        }
        _ => return,
    };
    if let Err(e) = result {
        let _ = write!(out, "ERR {}\r\n", e);
    }
}

#[entry]
fn main() -> ! {
    let dp = pac::Peripherals::take().unwrap();
    let cp = cortex_m::Peripherals::take().unwrap();

    let mut flash = dp.FLASH;
    let mut rcc = dp.RCC.configure().sysclk(48.mhz()).freeze(&mut flash);
    let gpioa = dp.GPIOA.split(&mut rcc);
    let gpiob = dp.GPIOB.split(&mut rcc);

    // A library requiring a critical section to set a gpio AF register is bad and I just won't.
    let fake_cs = unsafe { cortex_m::interrupt::CriticalSection::new() };

    // Initialize touch pins
    let _rev1 = gpioa.pa0.into_alternate_af3(&fake_cs);
    let _rev2 = gpioa.pa4.into_alternate_af3(&fake_cs);
    let _rev3 = gpiob.pb0.into_alternate_af3(&fake_cs);
    let _stop = gpiob.pb11.into_alternate_af3(&fake_cs);
    let _fwd1 = gpiob.pb13.into_alternate_af3(&fake_cs);
    let _fwd2 = gpioa.pa5.into_alternate_af3(&fake_cs);
    let _fwd3 = gpiob.pb1.into_alternate_af3(&fake_cs);
    let _g1_cap = gpioa.pa1.into_alternate_af3(&fake_cs);
    let _g2_cap = gpioa.pa6.into_alternate_af3(&fake_cs);
    let _g3_cap = gpiob.pb2.into_alternate_af3(&fake_cs);
    let _g6_cap = gpiob.pb12.into_alternate_af3(&fake_cs);

    let mut syst = hal::timers::Timer::syst(cp.SYST, 100.hz(), &mut rcc);
    syst.listen(&hal::timers::Event::TimeOut);

    let tx_pin = gpiob.pb6.into_alternate_af0(&fake_cs);
    let rx_pin = gpiob.pb7.into_alternate_af0(&fake_cs);
    let uart = hal::serial::Serial::usart1(dp.USART1, (tx_pin, rx_pin), 115200.bps(), &mut rcc);
    serial::console::init(uart, 4);
    let mut out = serial::console::Console;

    let mut touch = match setup_touch() {
        Ok(touch) => touch,
        Err(e) => {
            let _ = write!(out, "touch setup failed: {}\r\n", e);
            loop {
                cortex_m::asm::wfi();
            }
        }
    };

    let mut next_time = 10;

    loop {
        let time = TIME.load(Ordering::Relaxed);
        if time >= next_time {
            next_time += SCAN_PERIOD_TICKS;
            let _ = touch.trigger();
        }

        // Drives the acquisition phases as well as the pipeline
        if !touch.on_scan_complete().is_empty() {
            while let Some(event) = touch.pop_event() {
                serial::report(&mut out, &event);
            }
            if touch.is_sleeping() {
                if let Some(pad) = touch.get_wake_reason() {
                    let _ = touch.exit_sleep();
                    let _ = write!(out, "WAKE PAD{}\r\n", pad);
                }
            }
        }

        if let Some(cmd) = serial::console::read_command() {
            handle_command(&mut touch, cmd, &mut out);
        }
    }
}

#[exception]
fn SysTick() {
    let time = TIME.load(Ordering::Relaxed);
    TIME.store(time + 1, Ordering::Relaxed);
}
