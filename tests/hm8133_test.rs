//! HM8133 synthesizer driver through the generic parameter interface.

use rust_daq_drivers::adapters::MockAdapter;
use rust_daq_drivers::instrument::hm8133::{Hm8133, Modulation, ReferenceSource};
use rust_daq_drivers::parameter::Value;
use rust_daq_drivers::DaqError;

fn synth() -> MockAdapter {
    MockAdapter::new()
        .with_response("ID?", "HAMEG HM8133-2")
        .with_response("VER", "1.04")
        .with_response("STA", "OP0 RFI NMO")
        .with_response("FRQ?", "1.000000000E+09")
        .with_response("DBM?", "+7.0E+00")
        .with_response("AMP?", "5.01E-01")
        .with_response("FMD?", "1.0E+03")
        .with_response("AMT?", "30")
}

#[tokio::test]
async fn test_master_clear_state() {
    let mock = synth();
    let mut hm = Hm8133::connect("synth", mock.clone()).await.unwrap();
    hm.mclr().await.unwrap();

    let status = hm.status().await.unwrap();
    assert!(!status.output);
    assert_eq!(status.reference, ReferenceSource::Internal);
    assert_eq!(status.modulation, Modulation::Off);
    assert_eq!(hm.frequency().await.unwrap(), 1e9);
    assert_eq!(hm.level_dbm().await.unwrap(), 7.0);
    assert_eq!(hm.version().await.unwrap(), "1.04");
}

#[tokio::test]
async fn test_generic_set_and_get() {
    let mock = synth();
    let mut hm = Hm8133::new("synth", mock.clone());

    hm.set("frequency", 250e6).await.unwrap();
    hm.set("lvl_dbm", -30).await.unwrap();
    hm.set("modulation", "FRQ_400").await.unwrap();
    hm.set("output", "ON").await.unwrap();
    assert_eq!(
        mock.writes(),
        vec![
            "FRQ;2.5E+08".to_string(),
            "DBM;-3.0E+01".to_string(),
            "FM1".to_string(),
            "OP1".to_string(),
        ]
    );

    mock.set_response("STA", "OP1 RFI FM1");
    assert_eq!(hm.get("modulation").await.unwrap(), Value::from("FRQ_400"));
    assert_eq!(hm.get("output").await.unwrap(), Value::from("ON"));
    assert_eq!(hm.get("amp_dev").await.unwrap(), Value::from("30"));
}

#[tokio::test]
async fn test_read_only_parameters() {
    let mut hm = Hm8133::new("synth", synth());
    for name in ["status", "version", "who", "freq_dev", "amp_dev"] {
        assert!(matches!(
            hm.set(name, "x").await,
            Err(DaqError::ParameterReadOnly(_))
        ));
    }
}

#[tokio::test]
async fn test_snapshot_reads_every_parameter() {
    let mut hm = Hm8133::new("synth", synth());
    let snapshot = hm.snapshot().await.unwrap();
    let parameters = snapshot["parameters"].as_object().unwrap();
    assert_eq!(parameters.len(), 11);
    assert_eq!(parameters["lvl_volts"]["value"], 0.501);
    assert_eq!(parameters["lvl_volts"]["unit"], "V");
    assert_eq!(parameters["reference_frequency"]["value"], "INT");
    assert!(snapshot["ts"].is_string());
}

#[tokio::test]
async fn test_garbled_status_is_parse_error() {
    let mock = synth().with_response("STA", "ERR");
    let mut hm = Hm8133::new("synth", mock);
    assert!(matches!(
        hm.output().await,
        Err(DaqError::ResponseParse { .. })
    ));
}
