#![forbid(unsafe_code)]

mod common;

use std::fs;

use common::{FakeCloud, Harness, ScriptedGateway, DEPLOYMENT, DIGEST};
use kdeploy_application::Link;
use kdeploy_core::{DeployError, NAME_LABEL};
use kdeploy_deploy::PrepareOptions;
use kdeploy_store::parse_configs;

#[tokio::test]
async fn image_only_generates_pins_and_expands() {
    let out = tempfile::tempdir().unwrap();
    let h = Harness::new(ScriptedGateway::new(), FakeCloud::default(), out.path());
    let opts = PrepareOptions {
        image: Some("gcr.io/acme/web:v1".parse().unwrap()),
        app_name: Some("web".into()),
        app_version: Some("1.4.0".into()),
        suggested_output: out.path().join("suggested").display().to_string(),
        expanded_output: out.path().join("expanded").display().to_string(),
        namespace: Some("shop".into()),
        expose: 8080,
        create_application: true,
        application_links: vec![Link::new("Docs", "https://docs.acme.dev")],
        ..Default::default()
    };
    let report = h.deployer().prepare(&opts).await.unwrap();
    assert_eq!(report.digest.as_deref(), Some(DIGEST));

    let names: Vec<&str> = report.expanded.file_names().map(|s| s.as_str()).collect();
    assert_eq!(
        names,
        vec!["application.yaml", "deployment.yaml", "horizontalpodautoscaler.yaml", "namespace.yaml", "service.yaml"]
    );

    let deployment = report.expanded.get("deployment.yaml").unwrap();
    let image = deployment.nested_slice(&["spec", "template", "spec", "containers"]).unwrap().unwrap()[0]["image"]
        .as_str()
        .unwrap()
        .to_string();
    assert_eq!(image, format!("gcr.io/acme/web@{}", DIGEST));
    assert_eq!(deployment.namespace(), Some("shop"));
    assert_eq!(deployment.label(NAME_LABEL), Some("web"));
    assert_eq!(deployment.label("app.kubernetes.io/version"), Some("1.4.0"));
    assert_eq!(deployment.label("app.kubernetes.io/managed-by"), Some("kdeploy"));
    assert_eq!(
        deployment.nested_str(&["spec", "template", "metadata", "labels", NAME_LABEL]),
        Ok(Some("web"))
    );

    let ns = report.expanded.get("namespace.yaml").unwrap();
    assert_eq!(ns.name(), "shop");
    assert_eq!(ns.label("app.kubernetes.io/managed-by"), None);

    let app = report.expanded.get("application.yaml").unwrap();
    assert_eq!(app.nested_str(&["spec", "descriptor", "version"]), Ok(Some("1.4.0")));
    let links = app.nested_slice(&["spec", "descriptor", "links"]).unwrap().unwrap();
    assert_eq!(links[0]["url"], "https://docs.acme.dev");

    let svc = report.expanded.get("service.yaml").unwrap();
    assert_eq!(svc.name(), "web-service");

    let suggested = parse_configs(&out.path().join("suggested"), false).unwrap();
    let d = suggested.get("deployment.yaml").unwrap();
    let image = d.nested_slice(&["spec", "template", "spec", "containers"]).unwrap().unwrap()[0]["image"].clone();
    assert_eq!(image, "gcr.io/acme/web");
    assert_eq!(d.label("app.kubernetes.io/managed-by"), None);
    assert_eq!(d.namespace(), None);

    let expanded = parse_configs(&out.path().join("expanded"), false).unwrap();
    assert_eq!(&expanded, &report.expanded);
}

#[tokio::test]
async fn manifests_keep_their_names_and_get_custom_labels() {
    let dir = tempfile::tempdir().unwrap();
    let src = dir.path().join("src");
    fs::create_dir(&src).unwrap();
    fs::write(src.join("web.yaml"), DEPLOYMENT).unwrap();

    let h = Harness::new(ScriptedGateway::new(), FakeCloud::default(), dir.path());
    let mut opts = PrepareOptions {
        config: Some(src.display().to_string()),
        suggested_output: dir.path().join("s").display().to_string(),
        expanded_output: dir.path().join("e").display().to_string(),
        ..Default::default()
    };
    opts.labels.insert("team".into(), "payments".into());
    opts.annotations.insert("acme.dev/owner".into(), "payments@acme.dev".into());
    let report = h.deployer().prepare(&opts).await.unwrap();

    assert!(report.digest.is_none());
    let web = report.expanded.get("web.yaml").unwrap();
    assert_eq!(web.namespace(), Some("default"));
    assert_eq!(web.label("team"), Some("payments"));
    assert_eq!(web.label(NAME_LABEL), None);
    assert_eq!(
        web.nested_str(&["metadata", "annotations", "acme.dev/owner"]),
        Ok(Some("payments@acme.dev"))
    );
    assert!(h.events.warnings().is_empty());
}

#[tokio::test]
async fn embedded_namespace_is_overridden_with_warning() {
    let dir = tempfile::tempdir().unwrap();
    let src = dir.path().join("web.yaml");
    fs::write(&src, DEPLOYMENT.replace("  name: web\n", "  name: web\n  namespace: legacy\n")).unwrap();

    let h = Harness::new(ScriptedGateway::new(), FakeCloud::default(), dir.path());
    let opts = PrepareOptions {
        config: Some(src.display().to_string()),
        namespace: Some("default".into()),
        suggested_output: dir.path().join("s").display().to_string(),
        expanded_output: dir.path().join("e").display().to_string(),
        ..Default::default()
    };
    let report = h.deployer().prepare(&opts).await.unwrap();

    assert!(report.expanded.get("namespace.yaml").is_none());
    assert_eq!(report.expanded.get("web.yaml").unwrap().namespace(), Some("default"));
    let warnings = h.events.warnings();
    assert_eq!(warnings.len(), 1);
    assert!(warnings[0].contains("\"legacy\""), "{}", warnings[0]);
}

#[tokio::test]
async fn remote_locations_go_through_blob_transfer() {
    let bucket = tempfile::tempdir().unwrap();
    fs::create_dir_all(bucket.path().join("acme-configs/web")).unwrap();
    fs::write(bucket.path().join("acme-configs/web/deployment.yaml"), DEPLOYMENT).unwrap();

    let h = Harness::new(ScriptedGateway::new(), FakeCloud::default(), bucket.path());
    let opts = PrepareOptions {
        config: Some("gs://acme-configs/web".into()),
        suggested_output: "gs://acme-out/suggested".into(),
        expanded_output: "gs://acme-out/expanded".into(),
        ..Default::default()
    };
    h.deployer().prepare(&opts).await.unwrap();

    let uploads = h.transfer.uploads.lock().unwrap().clone();
    assert_eq!(
        uploads,
        vec![
            ("gs://acme-out/suggested".to_string(), vec!["deployment.yaml".to_string()]),
            ("gs://acme-out/expanded".to_string(), vec!["deployment.yaml".to_string()]),
        ]
    );
}

#[tokio::test]
async fn validation_happens_before_any_io() {
    let h = Harness::new(ScriptedGateway::new(), FakeCloud::default(), std::path::Path::new("/nonexistent"));
    let base = PrepareOptions {
        config: Some("/nonexistent/configs".into()),
        suggested_output: "/nonexistent/s".into(),
        expanded_output: "/nonexistent/e".into(),
        ..Default::default()
    };

    let mut reserved = base.clone();
    reserved.labels.insert("app.kubernetes.io/managed-by".into(), "me".into());
    let no_app = PrepareOptions { create_application: true, ..base.clone() };
    let expose = PrepareOptions { expose: 80, ..base.clone() };
    let empty_ns = PrepareOptions { namespace: Some(" ".into()), ..base.clone() };
    let no_source = PrepareOptions { config: None, ..base.clone() };

    for opts in [reserved, no_app, expose, empty_ns, no_source] {
        let err = h.deployer().prepare(&opts).await.unwrap_err();
        assert!(matches!(err, DeployError::Validation(_)), "err={}", err);
    }
}

#[tokio::test]
async fn empty_source_without_image_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let src = dir.path().join("src");
    fs::create_dir(&src).unwrap();
    fs::write(src.join("empty.yaml"), "# nothing here\n").unwrap();

    let h = Harness::new(ScriptedGateway::new(), FakeCloud::default(), dir.path());
    let opts = PrepareOptions {
        config: Some(src.display().to_string()),
        suggested_output: dir.path().join("s").display().to_string(),
        expanded_output: dir.path().join("e").display().to_string(),
        ..Default::default()
    };
    let err = h.deployer().prepare(&opts).await.unwrap_err();
    assert!(matches!(err, DeployError::Parse { .. }), "err={}", err);
    assert!(!dir.path().join("s").exists());

    let with_image = PrepareOptions { image: Some("gcr.io/acme/web:v1".parse().unwrap()), ..opts };
    let report = h.deployer().prepare(&with_image).await.unwrap();
    assert!(report.expanded.get("deployment.yaml").is_some());
}
