//! In-memory stand-in for the Spotify Web API, used by unit tests.
//!
//! Playlist contents are stored as plain URIs: `spotify:track:<id>` is a
//! normal track, `spotify:local:...` a local file and an empty string an
//! unavailable item (`"track": null`).

use std::cell::RefCell;
use std::collections::{HashMap, VecDeque};

use serde_json::{Value, json};

use super::{HttpBackend, Method, Request, Response, Result, Transport};

pub(crate) const BASE: &str = "https://api.test/v1";

#[derive(Debug, Clone)]
pub(crate) struct FakePlaylist {
    pub id: String,
    pub name: String,
    pub public: bool,
    pub description: String,
    pub uris: Vec<String>,
}

struct State {
    playlists: Vec<FakePlaylist>,
    features: HashMap<String, (f64, f64)>,
    log: Vec<Request>,
    failures: VecDeque<Option<u16>>,
    next_id: usize,
}

pub(crate) struct FakeSpotify {
    user_id: String,
    playlist_page_size: usize,
    state: RefCell<State>,
}

pub(crate) fn track_uri(id: &str) -> String {
    format!("spotify:track:{id}")
}

impl FakeSpotify {
    pub fn new(user_id: &str) -> Self {
        Self {
            user_id: user_id.to_string(),
            playlist_page_size: 50,
            state: RefCell::new(State {
                playlists: Vec::new(),
                features: HashMap::new(),
                log: Vec::new(),
                failures: VecDeque::new(),
                next_id: 1,
            }),
        }
    }

    pub fn with_playlist_page_size(mut self, size: usize) -> Self {
        self.playlist_page_size = size;
        self
    }

    pub fn base(&self) -> &'static str {
        BASE
    }

    /// Transport over this fake that never actually sleeps.
    pub fn transport(&self) -> Transport<&Self> {
        Transport::new(self, "test-token")
            .unwrap()
            .with_sleeper(|_| {})
    }

    pub fn add_playlist(&self, name: &str, uris: &[String]) -> String {
        let mut state = self.state.borrow_mut();
        let id = format!("pl{}", state.next_id);
        state.next_id += 1;
        state.playlists.push(FakePlaylist {
            id: id.clone(),
            name: name.to_string(),
            public: true,
            description: String::new(),
            uris: uris.to_vec(),
        });
        id
    }

    pub fn set_features(&self, track_id: &str, energy: f64, valence: f64) {
        self.state
            .borrow_mut()
            .features
            .insert(track_id.to_string(), (energy, valence));
    }

    /// Answer the next request with `status` instead of handling it.
    pub fn fail_next(&self, status: u16) {
        self.fail_after(0, status);
    }

    /// Handle `passes` more requests normally, then answer one with `status`.
    pub fn fail_after(&self, passes: usize, status: u16) {
        let mut state = self.state.borrow_mut();
        state.failures.extend(std::iter::repeat_n(None, passes));
        state.failures.push_back(Some(status));
    }

    pub fn request_count(&self) -> usize {
        self.state.borrow().log.len()
    }

    pub fn requests(&self) -> Vec<Request> {
        self.state.borrow().log.clone()
    }

    /// Every non-GET request, in order.
    pub fn mutations(&self) -> Vec<Request> {
        self.requests()
            .into_iter()
            .filter(|r| r.method != Method::Get)
            .collect()
    }

    pub fn playlist(&self, id: &str) -> Option<FakePlaylist> {
        self.state
            .borrow()
            .playlists
            .iter()
            .find(|p| p.id == id)
            .cloned()
    }

    pub fn playlist_named(&self, name: &str) -> Option<FakePlaylist> {
        self.state
            .borrow()
            .playlists
            .iter()
            .find(|p| p.name == name)
            .cloned()
    }

    pub fn playlist_count(&self) -> usize {
        self.state.borrow().playlists.len()
    }

    fn route(&self, request: &Request) -> Response {
        let Some(rest) = request.url.strip_prefix(BASE) else {
            return Response::new(404, "");
        };
        let (path, query) = rest.split_once('?').unwrap_or((rest, ""));
        let params: HashMap<&str, &str> = query
            .split('&')
            .filter_map(|kv| kv.split_once('='))
            .collect();
        let offset: usize = params.get("offset").and_then(|o| o.parse().ok()).unwrap_or(0);
        let segments: Vec<&str> = path.trim_start_matches('/').split('/').collect();

        match (request.method, segments.as_slice()) {
            (Method::Get, ["me"]) => ok(json!({"id": self.user_id, "display_name": "Fake"})),
            (Method::Get, ["me", "playlists"]) => self.list_playlists(offset),
            (Method::Post, ["users", user, "playlists"]) => self.create_playlist(user, request),
            (Method::Get, ["playlists", id, "tracks"]) => self.list_tracks(id, offset),
            (Method::Put, ["playlists", id, "tracks"]) => self.write_tracks(id, request, true),
            (Method::Post, ["playlists", id, "tracks"]) => self.write_tracks(id, request, false),
            (Method::Get, ["audio-features"]) => {
                self.features(params.get("ids").copied().unwrap_or(""))
            }
            _ => Response::new(404, ""),
        }
    }

    fn list_playlists(&self, offset: usize) -> Response {
        let state = self.state.borrow();
        let size = self.playlist_page_size;
        let items: Vec<Value> = state
            .playlists
            .iter()
            .skip(offset)
            .take(size)
            .map(|p| json!({"id": p.id, "name": p.name}))
            .collect();
        let next = (offset + size < state.playlists.len())
            .then(|| format!("{BASE}/me/playlists?limit={size}&offset={}", offset + size));
        ok(json!({"items": items, "next": next}))
    }

    fn list_tracks(&self, id: &str, offset: usize) -> Response {
        let state = self.state.borrow();
        let Some(playlist) = state.playlists.iter().find(|p| p.id == id) else {
            return Response::new(404, "");
        };
        let items: Vec<Value> = playlist
            .uris
            .iter()
            .skip(offset)
            .take(100)
            .map(|uri| {
                if uri.is_empty() {
                    json!({"track": null})
                } else if let Some(track_id) = uri.strip_prefix("spotify:track:") {
                    json!({"track": {"id": track_id, "uri": uri, "is_local": false}})
                } else {
                    json!({"track": {"id": null, "uri": uri, "is_local": true}})
                }
            })
            .collect();
        let next = (offset + 100 < playlist.uris.len())
            .then(|| format!("{BASE}/playlists/{id}/tracks?limit=100&offset={}", offset + 100));
        ok(json!({"items": items, "next": next}))
    }

    fn features(&self, ids: &str) -> Response {
        let ids: Vec<&str> = ids.split(',').filter(|s| !s.is_empty()).collect();
        if ids.len() > 100 {
            return Response::new(400, "too many ids");
        }
        let state = self.state.borrow();
        let list: Vec<Value> = ids
            .iter()
            .map(|id| match state.features.get(*id) {
                Some((energy, valence)) => json!({"id": id, "energy": energy, "valence": valence}),
                None => Value::Null,
            })
            .collect();
        ok(json!({"audio_features": list}))
    }

    fn create_playlist(&self, user: &str, request: &Request) -> Response {
        if user != self.user_id {
            return Response::new(403, "");
        }
        let Some(body) = parse_body(request) else {
            return Response::new(400, "");
        };
        let name = body["name"].as_str().unwrap_or_default();
        let id = self.add_playlist(name, &[]);
        let mut state = self.state.borrow_mut();
        if let Some(p) = state.playlists.iter_mut().find(|p| p.id == id) {
            p.public = body["public"].as_bool().unwrap_or(true);
            p.description = body["description"].as_str().unwrap_or_default().to_string();
        }
        Response::new(201, json!({"id": id, "name": name}).to_string())
    }

    fn write_tracks(&self, id: &str, request: &Request, replace: bool) -> Response {
        let Some(body) = parse_body(request) else {
            return Response::new(400, "");
        };
        let uris: Vec<String> = body["uris"]
            .as_array()
            .map(|a| a.iter().filter_map(|u| u.as_str().map(String::from)).collect())
            .unwrap_or_default();
        if uris.len() > 100 {
            return Response::new(400, "too many uris");
        }
        let mut state = self.state.borrow_mut();
        let Some(playlist) = state.playlists.iter_mut().find(|p| p.id == id) else {
            return Response::new(404, "");
        };
        if replace {
            playlist.uris = uris;
            ok(json!({"snapshot_id": "snap"}))
        } else {
            playlist.uris.extend(uris);
            Response::new(201, json!({"snapshot_id": "snap"}).to_string())
        }
    }
}

impl HttpBackend for FakeSpotify {
    fn execute(&self, request: &Request) -> Result<Response> {
        let failure = {
            let mut state = self.state.borrow_mut();
            state.log.push(request.clone());
            state.failures.pop_front().flatten()
        };
        if let Some(status) = failure {
            return Ok(Response::new(status, ""));
        }
        if request.header("Authorization") != Some("Bearer test-token") {
            return Ok(Response::new(401, ""));
        }
        Ok(self.route(request))
    }
}

fn ok(body: Value) -> Response {
    Response::new(200, body.to_string())
}

fn parse_body(request: &Request) -> Option<Value> {
    serde_json::from_str(request.body.as_deref()?).ok()
}
