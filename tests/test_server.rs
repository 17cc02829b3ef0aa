//! Local HTTP server for tests
//!
//! Serves a miniature procurement portal so Chrome tests do not depend on
//! external websites. Each server instance runs on a random available port.

use std::net::SocketAddr;
use tokio::sync::oneshot;
use warp::Filter;

const PORTAL: &str = r#"<!DOCTYPE html>
<html lang="es">
<head><title>Licitaciones</title></head>
<body>
    <nav>
        <button class="fd-button fd-user-menu__control" aria-haspopup="true"
                onclick="document.getElementById('scopes').style.display='block'">Más</button>
        <ul id="scopes" style="display:none">
            <li role="option" onclick="document.getElementById('env').textContent='Ambiente Productivo'">Corporación Nacional del Cobre</li>
        </ul>
        <span id="env"></span>
    </nav>
    <header>
        <button title="Menú de acciones"
                onclick="document.getElementById('actions').style.display='block'">⋮</button>
        <ul id="actions" style="display:none">
            <li onclick="this.textContent='Exportando...'">Exportar todas las filas</li>
        </ul>
    </header>
</body>
</html>"#;

const LOGIN: &str = r#"<!DOCTYPE html>
<html lang="es">
<head><title>Inicio de sesión</title></head>
<body>
    <form onsubmit="event.preventDefault(); window.location.href='/';">
        <input type="text" name="UserName" placeholder="usuario">
        <input type="password" name="Password">
        <input type="submit" value="Inicio de sesión">
    </form>
</body>
</html>"#;

const REDESIGNED: &str = r#"<!DOCTYPE html>
<html lang="es">
<head><title>Portal renovado</title></head>
<body>
    <form>
        <input type="email" id="acct" name="account_user" placeholder="Correo o usuario">
        <input type="password" id="pw">
    </form>
</body>
</html>"#;

/// Test server that serves the portal pages
pub struct TestServer {
    addr: SocketAddr,
    shutdown_tx: Option<oneshot::Sender<()>>,
}

impl TestServer {
    /// Start a new test server on a random available port
    pub async fn start() -> Self {
        let (shutdown_tx, shutdown_rx) = oneshot::channel();

        let portal = warp::path::end().map(|| warp::reply::html(PORTAL));
        let login = warp::path("login").map(|| warp::reply::html(LOGIN));
        let redesigned = warp::path("redesigned").map(|| warp::reply::html(REDESIGNED));
        let routes = portal.or(login).or(redesigned);

        let (addr, server) =
            warp::serve(routes).bind_with_graceful_shutdown(([127, 0, 0, 1], 0), async {
                shutdown_rx.await.ok();
            });
        tokio::spawn(server);

        Self {
            addr,
            shutdown_tx: Some(shutdown_tx),
        }
    }

    /// Base URL for this server (e.g., "http://127.0.0.1:12345")
    pub fn url(&self) -> String {
        format!("http://{}", self.addr)
    }

    /// Wait for the server to be ready by making a test request
    pub async fn wait_ready(&self) -> anyhow::Result<()> {
        let url = self.url();
        let max_attempts = 10;

        for attempt in 1..=max_attempts {
            match reqwest::get(&url).await {
                Ok(response) if response.status().is_success() => {
                    println!("✅ Test server ready on: {}", url);
                    return Ok(());
                }
                Ok(response) => {
                    println!(
                        "⚠️ Attempt {}: Server returned status {}",
                        attempt,
                        response.status()
                    );
                }
                Err(e) => {
                    println!("⚠️ Attempt {}: Server not ready - {}", attempt, e);
                }
            }

            if attempt < max_attempts {
                tokio::time::sleep(tokio::time::Duration::from_millis(100)).await;
            }
        }

        anyhow::bail!(
            "Server did not become ready after {} attempts",
            max_attempts
        )
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
    }
}
