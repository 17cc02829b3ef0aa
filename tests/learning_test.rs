//! Guided learning and reuse of what it mined


use mock_driver::{control, MockDriver, Reaction};
use std::time::Duration;
use tender_webdriver::control::{Action, Tier};
use tender_webdriver::diagnostics::{DiagnosticEntry, Diagnostics};
use tender_webdriver::browser::driver::PageDriver;
use tender_webdriver::learning::{guarded, mine_locators, GuidedLearning, LearningRecorder};
use tender_webdriver::resolver::{LocatorResolver, ResolveContext, ResolverSettings};
use tender_webdriver::targets::{self, TargetBook};
use tender_webdriver::InteractionExecutor;
use tokio::sync::mpsc;

const MENU: &str = "/html[1]/body[1]/header[1]/button[1]";
const EXPORT_ALL: &str = "/html[1]/body[1]/ul[1]/li[1]";

fn executor() -> InteractionExecutor {
    InteractionExecutor {
        method_timeout: Duration::from_secs(1),
        settle: Duration::ZERO,
    }
}

#[tokio::test]
async fn test_manual_step_is_captured_after_resume() {
    let dir = tempfile::tempdir().unwrap();
    let driver = MockDriver::new("https://portal.example/tenders/1").with_interactive(vec![
        control(MENU, "button", &[("title", "Menú de acciones")], "⋮"),
    ]);
    let diagnostics = Diagnostics::new(dir.path().join("diagnostics"));
    let recorder = LearningRecorder::new(dir.path().join("learning"));
    let (tx, mut rx) = mpsc::channel(1);

    // The "user" opens the menu, then signals
    let page = driver.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(50)).await;
        {
            let mut state = page.state();
            state.interactive.push(control(
                EXPORT_ALL,
                "li",
                &[("id", "export-all"), ("role", "menuitem")],
                "Exportar todas las filas",
            ));
            state.content.push_str("<ul><li id=\"export-all\">Exportar todas las filas</li></ul>");
        }
        tx.send(()).await.unwrap();
    });

    let learning = GuidedLearning::new(&driver, &diagnostics, &recorder);
    let artifact = learning.capture_step("export_all", &mut rx).await.unwrap();

    assert!(artifact.diff_analysis.page_changed);
    assert_eq!(artifact.diff_analysis.appeared.len(), 1);
    assert_eq!(artifact.diff_analysis.appeared[0].reference, EXPORT_ALL);
    assert!(artifact.diff_analysis.disappeared.is_empty());
    assert_eq!(artifact.learned_locators(), vec!["//li[@id='export-all']".to_string()]);

    assert!(diagnostics
        .entries()
        .iter()
        .any(|e| matches!(e, DiagnosticEntry::LearnedLocator { .. })));
    assert_eq!(recorder.load_all().await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_closed_resume_channel_is_an_error() {
    let dir = tempfile::tempdir().unwrap();
    let driver = MockDriver::new("https://portal.example/tenders/1");
    let diagnostics = Diagnostics::new(dir.path().join("diagnostics"));
    let recorder = LearningRecorder::new(dir.path().join("learning"));
    let (tx, mut rx) = mpsc::channel::<()>(1);
    drop(tx);

    let learning = GuidedLearning::new(&driver, &diagnostics, &recorder);
    let err = learning.capture_step("scope_control", &mut rx).await.unwrap_err();

    assert!(err.to_string().contains("scope_control"));
    assert!(recorder.load_all().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_mined_locator_is_reused_as_known_locator() {
    let dir = tempfile::tempdir().unwrap();
    let learning_dir = dir.path().join("learning");
    let diagnostics = Diagnostics::new(dir.path().join("diagnostics"));
    let recorder = LearningRecorder::new(&learning_dir);

    // First run: heuristic tier finds the menu while observed
    let first = MockDriver::new("https://portal.example/tenders/1").with_interactive(vec![control(
        MENU,
        "button",
        &[("title", "Menú de acciones"), ("aria-label", "Acciones de la tabla")],
        "⋮",
    )])
    .on_activate(
        MENU,
        Reaction::AppendContent("<ul><li>Exportar todas las filas</li></ul>".into()),
    );
    let book = TargetBook::builtin().unwrap();
    let settings = ResolverSettings {
        side_effect_wait: Duration::from_millis(10),
        exhaustive_enabled: false,
        script_enabled: false,
        ..ResolverSettings::default()
    };
    let resolver = LocatorResolver::new(&settings);
    let executor = executor();
    let learning = GuidedLearning::new(&first, &diagnostics, &recorder);
    let observed = learning
        .observe_resolution(
            &resolver,
            &executor,
            book.get(targets::EXPORT_MENU).unwrap(),
            &Action::Activate,
        )
        .await
        .unwrap();
    assert_eq!(
        observed.resolution.as_ref().unwrap().tier,
        Some(Tier::HeuristicSearch)
    );

    // Next run: the mined locator is tried with the configured ones
    let mined = mine_locators(&LearningRecorder::new(&learning_dir).load_all().await.unwrap());
    let learned = "//button[@aria-label='Acciones de la tabla']";
    assert_eq!(mined.get(targets::EXPORT_MENU).unwrap(), &vec![learned.to_string()]);

    let mut book = TargetBook::builtin().unwrap();
    book.merge_learned(&mined);
    let second = MockDriver::new("https://portal.example/tenders/2")
        .with_locator(learned, vec![control(MENU, "button", &[], "⋮")]);
    let ctx = ResolveContext {
        driver: &second,
        diagnostics: &diagnostics,
        executor: &executor,
    };
    let result = resolver
        .resolve(&ctx, book.get(targets::EXPORT_MENU).unwrap(), &Action::Activate)
        .await;

    assert!(result.success);
    assert_eq!(result.tier, Some(Tier::KnownLocator));
    assert_eq!(result.locator.as_deref(), Some(learned));
    assert_eq!(second.state().interactive_scans, 0);
}

#[tokio::test]
async fn test_failed_first_navigation_still_releases_driver() {
    let dir = tempfile::tempdir().unwrap();
    let diagnostics_dir = dir.path().join("diagnostics");
    let driver = MockDriver::new("about:blank").failing_navigations(1);
    let diagnostics = Diagnostics::new(&diagnostics_dir);

    let work = async {
        driver
            .navigate("https://portal.example/login", Duration::from_secs(1))
            .await?;
        anyhow::Ok(())
    };
    let err = guarded(&driver, &diagnostics, work, std::future::pending())
        .await
        .unwrap_err();

    assert!(err.to_string().contains("unreachable"));
    assert!(driver.state().shut_down);
    assert!(diagnostics_dir.join("trail.json").exists());
}

#[tokio::test]
async fn test_interrupted_learning_releases_driver() {
    let dir = tempfile::tempdir().unwrap();
    let diagnostics_dir = dir.path().join("diagnostics");
    let driver = MockDriver::new("https://portal.example/tenders/1");
    let diagnostics = Diagnostics::new(&diagnostics_dir);
    let recorder = LearningRecorder::new(dir.path().join("learning"));
    let (_tx, mut rx) = mpsc::channel::<()>(1);

    let learning = GuidedLearning::new(&driver, &diagnostics, &recorder);
    let work = learning.capture_step("scope_control", &mut rx);
    let cancel = tokio::time::sleep(Duration::from_millis(50));
    let err = guarded(&driver, &diagnostics, work, cancel).await.unwrap_err();

    assert!(err.to_string().contains("cancelled"));
    assert!(driver.state().shut_down);
    assert!(diagnostics_dir.join("trail.json").exists());
    assert!(recorder.load_all().await.unwrap().is_empty());
}
