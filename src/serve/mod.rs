use std::net::{TcpListener, TcpStream};
use std::path::PathBuf;

use serde_json::json;
use tracing::{info, warn};
use tungstenite::{accept, WebSocket};

use crate::listing;
use crate::store::sqlite::SqliteStore;
use crate::store::{Mode, Store, StoreError};

/// Connection settings shared by all client threads. Every thread opens its
/// own database handle, so no state is shared between requests.
#[derive(Clone, Debug)]
pub struct Settings {
    pub db: PathBuf,
    pub result_table: String,
    pub listen: String,
}

/// What a client can ask for, one JSON object per message. Mirrors the
/// command set of the original cgi endpoint.
#[derive(serde::Deserialize, serde::Serialize)]
#[serde(rename_all = "snake_case")]
enum Request {
    DbTest,
    GetBinaries,
    GetVariants {
        binary: String,
    },
    GetSourceFiles {
        variant: i64,
    },
    GetResultKinds,
    GetAsmCode {
        variant: i64,
        #[serde(default)]
        mode: Mode,
    },
    GetHighlevelCode {
        variant: i64,
        file: i64,
        #[serde(default)]
        mode: Mode,
    },
}

pub fn ws(settings: &Settings) -> anyhow::Result<()> {
    let server = TcpListener::bind(&settings.listen)?;
    info!("listening on {}", settings.listen);

    std::thread::scope(|s| {
        for stream in server.incoming() {
            if let Ok(stream) = stream {
                if let Ok(ws) = accept(stream) {
                    s.spawn(|| {
                        if let Err(e) = handle(ws, settings) {
                            warn!("client failed: {:#}", e);
                        }
                    });
                }
            }
        }
    });

    Ok(())
}

fn handle(mut ws: WebSocket<TcpStream>, settings: &Settings) -> anyhow::Result<()> {
    let store = SqliteStore::open(&settings.db, &settings.result_table)?;

    loop {
        let msg = ws.read()?;

        let msg = match msg {
            tungstenite::Message::Text(text) => text,
            tungstenite::Message::Ping(p) => {
                ws.send(tungstenite::Message::Pong(p))?;
                continue;
            }
            tungstenite::Message::Close(c) => {
                info!("closing: {:?}", c);
                break;
            }
            _ => continue,
        };

        let reply = match serde_json::from_str(&msg) {
            Ok(request) => match dispatch(&store, request) {
                Ok(value) => value,
                Err(e) => {
                    // the caller only learns that it failed, not why
                    warn!("request failed: {}", e);
                    json!({"error": "request failed"})
                }
            },
            Err(e) => {
                warn!("unparseable request: {}", e);
                json!({"error": "bad request"})
            }
        };

        ws.send(tungstenite::Message::Text(serde_json::to_string(&reply)?))?;
    }

    Ok(())
}

fn dispatch(store: &SqliteStore, request: Request) -> Result<serde_json::Value, StoreError> {
    Ok(match request {
        Request::DbTest => json!({"missing_tables": store.missing_tables()?}),
        Request::GetBinaries => json!({"binaries": store.binaries()?}),
        Request::GetVariants { binary } => {
            let variants: Vec<_> = store
                .variants(&binary)?
                .into_iter()
                .map(|(id, name)| json!({"id": id, "name": name}))
                .collect();
            json!({"variants": variants})
        }
        Request::GetSourceFiles { variant } => {
            let files: Vec<_> = remove_common_prefix(store.source_files(variant)?)
                .into_iter()
                .map(|(id, path)| json!({"id": id, "path": path}))
                .collect();
            json!({"source_files": files})
        }
        Request::GetResultKinds => json!({"result_kinds": store.result_kinds()?}),
        Request::GetAsmCode { variant, mode } => {
            json!({"asm": listing::asm_listing(store, variant, mode)?})
        }
        Request::GetHighlevelCode { variant, file, mode } => {
            json!({"highlevel": listing::source_listing(store, variant, file, mode)?})
        }
    })
}

/// Paths in the filename table are absolute build paths. Strip the prefix
/// shared by all of them so the client's file picker shows short names.
fn remove_common_prefix(files: Vec<(i64, String)>) -> Vec<(i64, String)> {
    let first = match files.first() {
        Some((_, path)) => path,
        None => return files,
    };

    // start from the first file's directory, shrink against every path
    let mut prefix = match first.rfind('/') {
        Some(idx) => first[..=idx].to_string(),
        None => String::new(),
    };

    for (_, path) in &files {
        let mut common = prefix
            .bytes()
            .zip(path.bytes())
            .take_while(|(a, b)| a == b)
            .count();
        while !prefix.is_char_boundary(common) {
            common -= 1;
        }
        prefix.truncate(common);

        if prefix.is_empty() {
            break;
        }
    }

    let cut = prefix.len();
    files
        .into_iter()
        .map(|(id, path)| {
            let short = path[cut..].to_string();
            (id, short)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn paths(raw: &[(i64, &str)]) -> Vec<(i64, String)> {
        raw.iter().map(|(id, p)| (*id, p.to_string())).collect()
    }

    #[test]
    fn strips_shared_directories() {
        let out = remove_common_prefix(paths(&[
            (1, "/src/app/main.c"),
            (2, "/src/app/util/helper.c"),
        ]));

        assert_eq!(out[0].1, "main.c");
        assert_eq!(out[1].1, "util/helper.c");
    }

    #[test]
    fn single_file_keeps_its_name() {
        let out = remove_common_prefix(paths(&[(1, "/src/app/main.c")]));
        assert_eq!(out[0].1, "main.c");
    }

    #[test]
    fn unrelated_roots_keep_their_paths() {
        let out = remove_common_prefix(paths(&[(1, "/a/x.c"), (2, "/b/y.c")]));

        assert_eq!(out[0].1, "a/x.c");
        assert_eq!(out[1].1, "b/y.c");
    }

    #[test]
    fn no_files_is_fine() {
        assert!(remove_common_prefix(Vec::new()).is_empty());
    }

    #[test]
    fn requests_parse() {
        let req: Request =
            serde_json::from_str(r#"{"get_asm_code": {"variant": 3, "mode": "right_edge"}}"#)
                .unwrap();
        assert!(matches!(
            req,
            Request::GetAsmCode {
                variant: 3,
                mode: Mode::RightEdge
            }
        ));

        // the mode defaults to the full trace
        let req: Request = serde_json::from_str(r#"{"get_asm_code": {"variant": 3}}"#).unwrap();
        assert!(matches!(
            req,
            Request::GetAsmCode {
                variant: 3,
                mode: Mode::FullTrace
            }
        ));
    }
}
