//! UT382 streaming against scripted display frames.

use luxmeter_daq::adapters::MockAdapter;
use luxmeter_daq::config::Ut382Config;
use luxmeter_daq::core::LuxUnit;
use luxmeter_daq::error::DaqError;
use luxmeter_daq::instrument::ut382::simulator::DisplayImage;
use luxmeter_daq::instrument::ut382::table::{Digit, Field, MenuPage, Value};
use luxmeter_daq::instrument::ut382::{SampleStreamExt, SyncMode, Ut382};

fn meter(link: &MockAdapter) -> Ut382<MockAdapter> {
    Ut382::new("ut382", link.clone(), &Ut382Config::default())
}

fn push_readings(link: &MockAdapter, shown: &[&str]) {
    for value in shown {
        link.push_input(&DisplayImage::new().lux(value).to_frame());
    }
}

#[test]
fn test_resyncs_after_partial_frame() {
    let link = MockAdapter::new();
    let frame = DisplayImage::new().lux("87.5").to_frame();
    link.push_input(&frame[20..]);
    link.push_input(&frame);
    let mut meter = meter(&link);

    let sample = meter.next_sample().unwrap().unwrap();
    assert_eq!(sample.lux, Some(87.5));
    assert_eq!(meter.sync_mode(), SyncMode::Synced);
}

#[test]
fn test_menu_pages_are_skipped() {
    let link = MockAdapter::new();
    link.push_input(&DisplayImage::new().menu(MenuPage::Usb).to_frame());
    link.push_input(&DisplayImage::new().menu(MenuPage::Rec).to_frame());
    push_readings(&link, &["250"]);
    let mut meter = meter(&link);

    let sample = meter.next_sample().unwrap().unwrap();
    assert_eq!(sample.lux, Some(250.0));
    assert!(!sample.fractional);
}

#[test]
fn test_frames_without_unit_are_skipped() {
    let link = MockAdapter::new();
    let no_unit = DisplayImage::new()
        .lux("11")
        .set(Field::Unit, Value::Unrecognized(0x0C));
    link.push_input(&no_unit.to_frame());
    link.push_input(&DisplayImage::new().lux("22").unit(LuxUnit::Footcandle).to_frame());
    let mut meter = meter(&link);

    let sample = meter.next_sample().unwrap().unwrap();
    assert_eq!(sample.lux, Some(22.0));
    assert_eq!(sample.unit, LuxUnit::Footcandle);
}

#[test]
fn test_over_range_has_no_reading() {
    let link = MockAdapter::new();
    let over = DisplayImage::new().big([
        Digit::Blank,
        Digit::Number(0),
        Digit::Letter('L'),
        Digit::Blank,
    ]);
    link.push_input(&over.to_frame());
    let mut meter = meter(&link);

    let sample = meter.next_sample().unwrap().unwrap();
    assert_eq!(sample.lux, None);
    assert_eq!(sample.formatted(), None);
}

#[test]
fn test_x10_scales_reading() {
    let link = MockAdapter::new();
    link.push_input(&DisplayImage::new().lux("1999").x10().to_frame());
    let mut meter = meter(&link);
    assert_eq!(meter.next_sample().unwrap().unwrap().lux, Some(19990.0));
}

#[test]
fn test_drained_link_ends_stream_after_one_error() {
    let link = MockAdapter::new();
    push_readings(&link, &["5", "6"]);
    link.fail_when_drained();
    let mut meter = meter(&link);

    let results: Vec<_> = meter.monitor().collect();
    assert_eq!(results.len(), 3);
    assert_eq!(results[0].as_ref().unwrap().lux, Some(5.0));
    assert_eq!(results[1].as_ref().unwrap().lux, Some(6.0));
    assert!(matches!(results[2], Err(DaqError::ConnectionLost(_))));
}

#[test]
fn test_delta_over_monitor() {
    let link = MockAdapter::new();
    push_readings(&link, &["10", "10", "10", "12", "12", "10"]);
    link.fail_when_drained();
    let mut meter = meter(&link);

    let mut shown = Vec::new();
    let mut errors = 0;
    for sample in meter.monitor().delta() {
        match sample {
            Ok(sample) => shown.push(sample.formatted()),
            Err(_) => errors += 1,
        }
    }
    assert_eq!(
        shown,
        vec![
            Some("10".to_string()),
            Some("12".to_string()),
            Some("10".to_string())
        ]
    );
    assert_eq!(errors, 1);
}

#[test]
fn test_delta_not_reset_by_over_range() {
    let link = MockAdapter::new();
    let over = DisplayImage::new().big([
        Digit::Blank,
        Digit::Number(0),
        Digit::Letter('L'),
        Digit::Blank,
    ]);
    push_readings(&link, &["10"]);
    link.push_input(&over.to_frame());
    push_readings(&link, &["10", "15"]);
    link.fail_when_drained();
    let mut meter = meter(&link);

    let printed: Vec<String> = meter
        .monitor()
        .delta()
        .filter_map(|sample| sample.ok().and_then(|s| s.formatted()))
        .collect();
    assert_eq!(printed, vec!["10", "15"]);
}

#[test]
fn test_moving_average_over_monitor() {
    let link = MockAdapter::new();
    push_readings(&link, &["1", "2", "3", "4", "5", "6", "7", "8", "9"]);
    link.fail_when_drained();
    let mut meter = meter(&link);

    let mut stream = meter.monitor().moving_average(1);
    let averaged = stream.next().unwrap().unwrap();
    assert_eq!(averaged.lux, Some(4.5));
    assert_eq!(averaged.formatted().as_deref(), Some("4.50"));
    // The ninth reading is still pending when the link fails
    assert!(matches!(stream.next(), Some(Err(DaqError::ConnectionLost(_)))));
    assert!(stream.next().is_none());
}
