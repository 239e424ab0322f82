//! Certificate listing against the in-process plugin host.

mod support;

use cadesign::Certificate;
use cadesign::SigningClient;
use cadesign::SigningConfig;

use support::FakeCert;
use support::FakeHost;
use support::HostConfig;
use support::OID_GOST_2012_256;
use support::OID_RSA;

#[tokio::test]
async fn test_lists_only_certificates_with_private_key() {
    support::init_tracing();
    let certs = vec![
        FakeCert::new("01", "SN=Иванов, G=Иван, CN=ООО Ромашка", OID_GOST_2012_256),
        FakeCert::new("02", "CN=Root CA", OID_RSA).without_private_key(),
        FakeCert::new("03", "CN=Broken", OID_RSA).unreadable(),
        FakeCert::new("04", "CN=\"Acme, Inc.\", O=Acme", OID_RSA),
    ];
    let (bridge, host) = FakeHost::start(HostConfig::with_certificates(certs));
    let client = SigningClient::connect(&bridge, SigningConfig::default()).await.unwrap();

    let listed = client.list_certificates().await.unwrap();

    assert_eq!(
        listed,
        vec![
            Certificate { thumbprint: "01".into(), subject_name: "SN=Иванов, G=Иван, CN=ООО Ромашка".into() },
            Certificate { thumbprint: "04".into(), subject_name: "CN=\"Acme, Inc.\", O=Acme".into() },
        ]
    );
    assert_eq!(listed[0].display_name(), "Иванов Иван");
    assert_eq!(listed[1].display_name(), "Acme, Inc.");

    let state = host.state();
    assert_eq!(state.count("Certificates.Item"), 4);
    assert_eq!(state.opens, 1);
    assert_eq!(state.open_stores(), 0);
}

#[tokio::test]
async fn test_empty_store() -> anyhow::Result<()> {
    let (bridge, host) = FakeHost::start(HostConfig::default());
    let client = SigningClient::connect(&bridge, SigningConfig::default()).await?;

    assert!(client.list_certificates().await?.is_empty());
    assert_eq!(host.state().count("Certificates.Item"), 0);
    assert_eq!(host.state().open_stores(), 0);
    Ok(())
}

#[tokio::test]
async fn test_listed_certificate_selects_itself() {
    let certs = vec![
        FakeCert::new("AA", "CN=First", OID_RSA),
        FakeCert::new("BB", "CN=Second", OID_GOST_2012_256),
    ];
    let (bridge, _host) = FakeHost::start(HostConfig::with_certificates(certs));
    let client = SigningClient::connect(&bridge, SigningConfig::default()).await.unwrap();

    let listed = client.list_certificates().await.unwrap();
    let outcome = client
        .sign(&mut cadesign::MemorySource::new(b"payload".to_vec()), &listed[1].selector())
        .await
        .unwrap();
    assert_eq!(outcome.algorithm.id, 101);
}

#[tokio::test]
async fn test_reset_releases_plugin_objects() {
    let (bridge, _host) = FakeHost::start(HostConfig::with_certificates(vec![FakeCert::new("AA", "CN=A", OID_RSA)]));
    let client = SigningClient::connect(&bridge, SigningConfig::default()).await.unwrap();
    client.list_certificates().await.unwrap();

    assert!(bridge.reset().await.unwrap());
}
