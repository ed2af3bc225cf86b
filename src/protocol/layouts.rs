// src/protocol/layouts.rs
//! Field layouts of the GL200 frame family

use super::pattern::{Matcher, Run, Template, Width};
use once_cell::sync::Lazy;

pub static HEARTBEAT: Lazy<Matcher> =
    Lazy::new(|| heartbeat().compile().expect("heartbeat layout compiles"));

pub static INFO: Lazy<Matcher> = Lazy::new(|| info().compile().expect("info layout compiles"));

pub static DIAGNOSTICS: Lazy<Matcher> =
    Lazy::new(|| diagnostics().compile().expect("diagnostics layout compiles"));

pub static LOCATION: Lazy<Matcher> =
    Lazy::new(|| location().compile().expect("location layout compiles"));

pub static LOCATION_BACKUP: Lazy<Matcher> =
    Lazy::new(|| location_backup().compile().expect("backup location layout compiles"));

// `[0-9A-Z]{2}xxxx`
fn protocol_version() -> Run {
    Run::Seq(vec![Run::Alnum(Width::Exact(2)), Run::Hex(Width::Exact(4))])
}

fn vin() -> Run {
    Run::Alnum(Width::Exact(17))
}

fn device_name() -> Run {
    Run::FreeText(Width::Between(0, 20))
}

fn imei() -> Run {
    Run::Digits(Width::Exact(15))
}

fn counter() -> Run {
    Run::Hex(Width::Exact(4))
}

fn speed() -> Run {
    Run::Decimal {
        signed: false,
        int: Width::Between(1, 3),
        frac: Width::Exact(1),
    }
}

fn altitude() -> Run {
    Run::Decimal {
        signed: true,
        int: Width::Between(1, 5),
        frac: Width::Exact(1),
    }
}

fn longitude() -> Run {
    Run::Decimal {
        signed: true,
        int: Width::Between(1, 3),
        frac: Width::Exact(6),
    }
}

fn latitude() -> Run {
    Run::Decimal {
        signed: true,
        int: Width::Between(1, 2),
        frac: Width::Exact(6),
    }
}

// `0ddd`
fn network_code() -> Run {
    Run::Seq(vec![Run::Literal("0"), Run::Digits(Width::Exact(3))])
}

fn terminator() -> Template {
    Template::new().text("$")
}

// `+RESP:GTxxx,` or `+BUFF:GTxxx,`
fn report_header(template: Template) -> Template {
    template
        .text("+")
        .skip(Run::Either(vec![Run::Literal("RESP"), Run::Literal("BUFF")]))
        .text(":GT")
        .skip(Run::Any(Width::Exact(3)))
        .text(",")
        .maybe_skip(protocol_version())
        .text(",")
}

/// speed, course, altitude, longitude, latitude, fix date+time, then MCC, MNC,
/// LAC and cell id
fn fix_and_cell(template: Template) -> Template {
    template
        .maybe(speed())
        .text(",")
        .maybe(Run::Digits(Width::Between(1, 3))) // course
        .text(",")
        .maybe(altitude())
        .text(",")
        .maybe(longitude())
        .text(",")
        .maybe(latitude())
        .text(",")
        .optional(Template::new().date_time())
        .text(",")
        .maybe(network_code()) // mcc
        .text(",")
        .maybe(network_code()) // mnc
        .text(",")
        .maybe(Run::Hex(Width::Exact(4))) // lac
        .text(",")
        .maybe(Run::Hex(Width::Exact(4))) // cell id
        .text(",")
        .skip(Run::Digits(Width::AtLeast(0))) // reserved
        .text(",")
}

pub fn heartbeat() -> Template {
    Template::new()
        .text("+ACK:GTHBD,")
        .field(protocol_version())
        .text(",")
        .skip(Run::Any(Width::AtLeast(0)))
        .text(",")
        .field(counter())
        .optional(terminator())
}

pub fn info() -> Template {
    Template::new()
        .text("+RESP:GTINF,")
        .skip(protocol_version())
        .text(",")
        .field(imei())
        .text(",")
        .skip(vin())
        .text(",")
        .skip(device_name())
        .text(",")
        .field(Run::Hex(Width::Exact(2))) // state
        .text(",")
        .skip(Run::Charset("0-9F", Width::Exact(20))) // iccid
        .text(",")
        .skip(Run::Digits(Width::Between(1, 2)))
        .text(",")
        .skip(Run::Digits(Width::Between(1, 2)))
        .text(",")
        .skip(Run::Flag)
        .text(",")
        .field(Run::Digits(Width::Between(1, 5))) // power
        .text(",,")
        .field(Run::Decimal {
            signed: false,
            int: Width::AtLeast(1),
            frac: Width::AtLeast(1),
        }) // battery
        .text(",")
        .field(Run::Flag) // charging
        .text(",")
        .skip(Run::Flag)
        .text(",,,")
        .skip(Run::Digits(Width::Exact(14))) // last fix time
        .text(",,,,,,")
        .skip(Run::Seq(vec![
            Run::Charset("-+", Width::Exact(1)),
            Run::Digits(Width::Exact(4)),
        ])) // timezone
        .text(",")
        .skip(Run::Flag) // daylight saving
        .text(",")
        .date_time()
        .text(",")
        .field(counter())
        .optional(terminator())
}

pub fn diagnostics() -> Template {
    let template = Template::new()
        .text("+RESP:GTOBD,")
        .skip(protocol_version())
        .text(",")
        .field(imei())
        .text(",")
        .maybe_skip(vin())
        .text(",")
        .skip(device_name())
        .text(",")
        .skip(Run::Flag) // report type
        .text(",")
        .skip(Run::Hex(Width::Between(1, 8))) // report mask
        .text(",")
        .maybe_skip(vin())
        .text(",")
        .skip(Run::Flag) // obd connect
        .text(",")
        .maybe_skip(Run::Digits(Width::Between(1, 5))) // obd voltage
        .text(",")
        .maybe_skip(Run::Hex(Width::Exact(8))) // supported pids
        .text(",")
        .maybe(Run::Digits(Width::Between(1, 5))) // engine rpm
        .text(",")
        .maybe(Run::Digits(Width::Between(1, 3))) // speed
        .text(",")
        .maybe(Run::Signed(Width::Between(1, 3))) // coolant temperature
        .text(",")
        .maybe(Run::Either(vec![
            Run::Float,
            Run::Literal("Inf"),
            Run::Literal("NaN"),
        ])) // fuel consumption
        .text(",")
        .maybe(Run::Digits(Width::Between(1, 5))) // distance since dtcs cleared
        .text(",")
        .maybe_skip(Run::Digits(Width::Between(1, 5)))
        .text(",")
        .maybe(Run::Flag) // obd connect
        .text(",")
        .maybe(Run::Digits(Width::Between(1, 3))) // number of dtcs
        .text(",")
        .field(Run::Hex(Width::AtLeast(0))) // dtcs
        .text(",")
        .maybe(Run::Digits(Width::Between(1, 3))) // throttle
        .text(",")
        .maybe_skip(Run::Digits(Width::Between(1, 3))) // engine load
        .text(",")
        .maybe(Run::Digits(Width::Between(1, 3))) // fuel level
        .text(",")
        .field(Run::Digits(Width::AtLeast(1))) // obd odometer
        .text(",")
        .maybe_skip(Run::Digits(Width::Between(1, 2))) // gps accuracy
        .text(",");

    fix_and_cell(template)
        .maybe(Run::Decimal {
            signed: false,
            int: Width::Between(1, 7),
            frac: Width::Exact(1),
        }) // odometer
        .text(",")
        .optional(Template::new().date_time())
        .text(",")
        .field(counter())
        .optional(terminator())
}

pub fn location() -> Template {
    let template = report_header(Template::new())
        .field(imei())
        .text(",")
        .skip(Run::FreeText(Width::AtLeast(0))) // device name
        .text(",")
        .skip(Run::Digits(Width::Exact(1))) // report id
        .text(",")
        .skip(Run::Digits(Width::Exact(1))) // report type
        .text(",")
        .skip(Run::Digits(Width::Between(1, 2))) // report number
        .text(",")
        .maybe_skip(Run::Digits(Width::Between(1, 2))) // gps accuracy
        .text(",");

    fix_and_cell(template)
        .maybe(Run::Digits(Width::Between(1, 3))) // battery
        .text(",")
        .optional(Template::new().date_time())
        .text(",")
        .field(counter())
        .optional(terminator())
}

pub fn location_backup() -> Template {
    report_header(Template::new())
        .field(Run::Either(vec![imei(), Run::Hex(Width::Exact(14))]))
        .text(",")
        .skip(Run::Any(Width::AtLeast(0)))
        .maybe(speed())
        .text(",")
        .maybe(Run::Digits(Width::Between(1, 3))) // course
        .text(",")
        .maybe(altitude())
        .text(",")
        .field(longitude())
        .text(",")
        .field(latitude())
        .text(",")
        .date_time()
        .text(",")
        .skip(Run::Any(Width::AtLeast(0)))
        .field(counter())
        .optional(terminator())
}
