//! Headless Chrome against the local portal
//!
//! These need a Chrome or Chromium install. Run with `--ignored`.

mod test_server;

use std::time::Duration;
use tender_webdriver::browser::chrome::ChromeDriver;
use tender_webdriver::browser::driver::PageDriver;
use tender_webdriver::control::{Action, Tier};
use tender_webdriver::diagnostics::Diagnostics;
use tender_webdriver::resolver::{LocatorResolver, ResolveContext, ResolverSettings};
use tender_webdriver::snapshot::{capture_snapshot, SnapshotOptions};
use tender_webdriver::targets::{self, TargetBook};
use tender_webdriver::InteractionExecutor;
use test_server::TestServer;

const READY: Duration = Duration::from_secs(10);

async fn create_headless_driver() -> anyhow::Result<ChromeDriver> {
    ChromeDriver::launch_headless(None)
        .await
        .map_err(|e| anyhow::anyhow!("Failed to launch Chrome: {}", e))
}

#[tokio::test]
#[ignore = "requires Chrome"]
async fn test_snapshot_of_portal_page() -> anyhow::Result<()> {
    let server = TestServer::start().await;
    server.wait_ready().await?;
    let driver = create_headless_driver().await?;

    driver.navigate(&server.url(), READY).await?;
    let snapshot = capture_snapshot(&driver, "portal", &SnapshotOptions::default()).await?;

    assert_eq!(snapshot.title, "Licitaciones");
    assert_eq!(snapshot.fingerprint.len(), 64);
    assert!(snapshot
        .controls
        .iter()
        .any(|c| c.attribute("title") == Some("Menú de acciones")));
    assert!(snapshot.controls.iter().all(|c| c.reference.starts_with('/')));

    let png = driver.screenshot().await?;
    assert_eq!(&png[..4], &[0x89, b'P', b'N', b'G']);

    driver.shutdown().await?;
    Ok(())
}

#[tokio::test]
#[ignore = "requires Chrome"]
async fn test_login_fields_resolve_by_known_locator() -> anyhow::Result<()> {
    let server = TestServer::start().await;
    server.wait_ready().await?;
    let driver = create_headless_driver().await?;
    let dir = tempfile::tempdir()?;
    let diagnostics = Diagnostics::new(dir.path());
    let executor = InteractionExecutor::default();
    let book = TargetBook::builtin()?;
    let resolver = LocatorResolver::new(&ResolverSettings::default());

    driver.navigate(&format!("{}/login", server.url()), READY).await?;
    let ctx = ResolveContext {
        driver: &driver,
        diagnostics: &diagnostics,
        executor: &executor,
    };

    let user = resolver
        .resolve(&ctx, book.get(targets::USERNAME).unwrap(), &Action::Type("buyer".into()))
        .await;
    assert!(user.success, "attempts: {:?}", user.attempts);
    assert_eq!(user.tier, Some(Tier::KnownLocator));

    let reference = user.control.as_ref().unwrap().reference.clone();
    assert_eq!(driver.read_value(&reference).await?, "buyer");

    let submit = resolver
        .resolve(&ctx, book.get(targets::SUBMIT).unwrap(), &Action::Activate)
        .await;
    assert!(submit.success);

    tokio::time::sleep(Duration::from_millis(500)).await;
    assert!(!driver.current_url().await?.contains("/login"));

    driver.shutdown().await?;
    Ok(())
}

#[tokio::test]
#[ignore = "requires Chrome"]
async fn test_redesigned_page_falls_back_to_heuristics() -> anyhow::Result<()> {
    let server = TestServer::start().await;
    server.wait_ready().await?;
    let driver = create_headless_driver().await?;
    let dir = tempfile::tempdir()?;
    let diagnostics = Diagnostics::new(dir.path());
    let executor = InteractionExecutor::default();
    let book = TargetBook::builtin()?;

    driver.navigate(&format!("{}/redesigned", server.url()), READY).await?;
    let ctx = ResolveContext {
        driver: &driver,
        diagnostics: &diagnostics,
        executor: &executor,
    };
    let result = LocatorResolver::new(&ResolverSettings::default())
        .resolve(&ctx, book.get(targets::USERNAME).unwrap(), &Action::Type("buyer".into()))
        .await;

    assert!(result.success);
    assert_eq!(result.tier, Some(Tier::HeuristicSearch));
    assert_eq!(driver.read_value(result.locator.as_deref().unwrap()).await?, "buyer");
    assert!(diagnostics.screenshot_count() >= 2);

    driver.shutdown().await?;
    Ok(())
}

#[tokio::test]
#[ignore = "requires Chrome"]
async fn test_scope_menu_reveals_option() -> anyhow::Result<()> {
    let server = TestServer::start().await;
    server.wait_ready().await?;
    let driver = create_headless_driver().await?;
    let dir = tempfile::tempdir()?;
    let diagnostics = Diagnostics::new(dir.path());
    let executor = InteractionExecutor::default();
    let book = TargetBook::builtin()?;
    let resolver = LocatorResolver::new(&ResolverSettings::default());

    driver.navigate(&server.url(), READY).await?;
    let ctx = ResolveContext {
        driver: &driver,
        diagnostics: &diagnostics,
        executor: &executor,
    };

    for target in [targets::SCOPE_CONTROL, targets::SCOPE_OPTION] {
        let result = resolver
            .resolve(&ctx, book.get(target).unwrap(), &Action::Activate)
            .await;
        assert!(result.success, "{} unresolved: {:?}", target, result.attempts);
    }
    assert!(driver.is_text_visible(&["Ambiente Productivo".to_string()]).await?);

    driver.shutdown().await?;
    Ok(())
}
