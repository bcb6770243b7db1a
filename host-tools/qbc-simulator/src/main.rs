use itertools::Itertools;
use log::info;
use qbc_common::{Property, Status};
use qbc_hooks::{
    fake::{self, FakeHost, FakeSupply},
    ArmState, HookOutcome, Interceptor, InterceptorConfig,
};
use std::ffi::CString;
use structopt::StructOpt;

const ABOUT: &str = r#"Sweeps a simulated battery voltage through the capacity interceptor

Examples:
    # Default map from 3.0V to 4.6V in 50mV steps
    qbc-simulator

    # Charger driver loads after the module, voltage reads fail
    qbc-simulator --deferred --voltage-fails --native-capacity 4
"#;

const SUPPLY: FakeSupply = FakeSupply(0);

#[derive(Debug, StructOpt)]
#[structopt(about = ABOUT)]
pub struct Opts {
    /// First voltage of the sweep, in microvolts
    #[structopt(long, default_value = "3000000")]
    pub from: i32,

    /// Last voltage of the sweep, in microvolts
    #[structopt(long, default_value = "4600000")]
    pub to: i32,

    /// Sweep step, in microvolts
    #[structopt(long, default_value = "50000")]
    pub step: u32,

    /// Capacity the native fuel gauge reports
    #[structopt(long, default_value = "42")]
    pub native_capacity: i32,

    /// Make every VOLTAGE_NOW read fail
    #[structopt(long)]
    pub voltage_fails: bool,

    /// Load the module before the charger driver
    #[structopt(long)]
    pub deferred: bool,

    /// Model name to report
    #[structopt(long, default_value = "SNYSCA6")]
    pub model_name: String,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let opts = Opts::from_args();

    let model_name = CString::new(opts.model_name.clone())?;
    let config = InterceptorConfig {
        model_name: &model_name,
        ..InterceptorConfig::DEFAULT
    };
    let host = if opts.deferred {
        FakeHost::kernel()
    } else {
        FakeHost::kernel_with_charger()
    };
    let interceptor = Interceptor::new(host, config);

    interceptor.init().map_err(|e| e.to_string())?;
    if interceptor.state() == ArmState::Deferred {
        fake::load_module(&interceptor, config.target_module, &fake::CHARGER_EXPORTS);
    }
    info!("interceptor {}", interceptor.state());

    interceptor.host().set_capacity(opts.native_capacity);
    if opts.voltage_fails {
        interceptor.host().fail_voltage(Status(-61));
    }

    let (_, name) = fake::get_property(&interceptor, SUPPLY, Property::ModelName);
    println!("Model name: {}", String::from_utf8_lossy(name.str_bytes()));
    println!();
    println!("{:>12} {:>8} {:>9}  outcome", "voltage uV", "native", "reported");

    let step = opts.step.max(1) as usize;
    let mut readings = Vec::new();
    for voltage in (opts.from..=opts.to).step_by(step) {
        if !opts.voltage_fails {
            interceptor.host().set_voltage(voltage);
        }
        let mut out = fake::FakeValue::default();
        interceptor.host().native_get_property(Property::Capacity, &mut out);
        let outcome = interceptor.after_get_property(SUPPLY, Property::Capacity, &mut out);
        println!(
            "{:>12} {:>8} {:>9}  {}",
            voltage,
            opts.native_capacity,
            out.intval,
            describe(&outcome)
        );
        readings.push((voltage, out.intval));
    }

    let drops: Vec<_> = readings
        .iter()
        .tuple_windows()
        .filter(|((_, a), (_, b))| b < a)
        .collect();
    println!();
    if drops.is_empty() {
        println!("Reported capacity is monotonic over {} readings", readings.len());
    } else {
        for ((va, a), (vb, b)) in drops {
            println!("Capacity dropped from {} to {} between {} and {} uV", a, b, va, vb);
        }
    }

    let stats = interceptor.stats();
    println!(
        "estimated {} fetch failed {} model name {} nested calls {}",
        stats.estimated, stats.fetch_failed, stats.model_name, stats.nested
    );

    interceptor.disarm();
    Ok(())
}

fn describe(outcome: &HookOutcome) -> String {
    match outcome {
        HookOutcome::Estimated { voltage, capacity } => {
            format!("estimated {}% at {}", capacity, voltage)
        }
        HookOutcome::FetchFailed { status, clamped } => {
            if *clamped {
                format!("voltage read failed ({}), floored", status)
            } else {
                format!("voltage read failed ({}), kept native", status)
            }
        }
        other => format!("{:?}", other),
    }
}
