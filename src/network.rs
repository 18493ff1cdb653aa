//! Stubbed HTTP layer.
//!
//! Requests never leave the process: a [`Backend`] answers them synchronously
//! and the harness delivers the answer later through its clock.

use std::collections::BTreeMap;
use std::fmt;

use serde::de::DeserializeOwned;
use serde_json::{Value, json};

use crate::crud::ProductRecord;
use crate::{Error, Result};

const PRODUCTS_PATH: &str = "/productos";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Method {
    Get,
    Post,
    Put,
    Delete,
}

impl Method {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Get => "GET",
            Self::Post => "POST",
            Self::Put => "PUT",
            Self::Delete => "DELETE",
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchRequest {
    pub method: Method,
    pub url: String,
    pub body: Option<String>,
}

impl FetchRequest {
    pub fn get(url: &str) -> Self {
        Self {
            method: Method::Get,
            url: url.to_string(),
            body: None,
        }
    }

    pub fn delete(url: &str) -> Self {
        Self {
            method: Method::Delete,
            url: url.to_string(),
            body: None,
        }
    }

    /// A request carrying a JSON body.
    pub fn with_json<T: serde::Serialize>(method: Method, url: &str, body: &T) -> Result<Self> {
        Ok(Self {
            method,
            url: url.to_string(),
            body: Some(serde_json::to_string(body)?),
        })
    }

    pub fn body_json(&self) -> Result<Value> {
        let body = self
            .body
            .as_deref()
            .ok_or_else(|| Error::Json(format!("{} {} has no body", self.method, self.url)))?;
        Ok(serde_json::from_str(body)?)
    }
}

impl fmt::Display for FetchRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.method, self.url)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchResponse {
    pub status: u16,
    pub body: String,
}

impl FetchResponse {
    pub fn new(status: u16, body: Value) -> Self {
        Self {
            status,
            body: body.to_string(),
        }
    }

    pub fn ok(&self) -> bool {
        (200..300).contains(&self.status)
    }

    pub fn json<T: DeserializeOwned>(&self) -> Result<T> {
        Ok(serde_json::from_str(&self.body)?)
    }
}

/// Answers fetches issued through the harness.
pub trait Backend: fmt::Debug {
    fn handle(&mut self, request: &FetchRequest) -> FetchResponse;
}

/// In-memory product service with the `/productos` REST surface.
#[derive(Debug, Default, Clone)]
pub struct ProductBackend {
    products: BTreeMap<u64, ProductRecord>,
    next_id: u64,
}

impl ProductBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts a product directly, bypassing the HTTP surface. Returns its id.
    pub fn seed(&mut self, nombre: &str, precio: f64, descripcion: &str) -> u64 {
        let id = self.allocate_id();
        self.products.insert(
            id,
            ProductRecord {
                id,
                nombre: nombre.to_string(),
                precio: precio.is_finite().then_some(precio),
                descripcion: descripcion.to_string(),
            },
        );
        id
    }

    pub fn products(&self) -> Vec<ProductRecord> {
        self.products.values().cloned().collect()
    }

    pub fn get(&self, id: u64) -> Option<&ProductRecord> {
        self.products.get(&id)
    }

    pub fn len(&self) -> usize {
        self.products.len()
    }

    pub fn is_empty(&self) -> bool {
        self.products.is_empty()
    }

    fn allocate_id(&mut self) -> u64 {
        self.next_id += 1;
        self.next_id
    }

    fn list(&self) -> FetchResponse {
        let records: Vec<&ProductRecord> = self.products.values().collect();
        FetchResponse::new(200, json!(records))
    }

    fn show(&self, id: u64) -> FetchResponse {
        match self.products.get(&id) {
            Some(record) => FetchResponse::new(200, json!(record)),
            None => not_found("Producto no encontrado"),
        }
    }

    fn create(&mut self, request: &FetchRequest) -> FetchResponse {
        let fields = match parse_product_fields(request) {
            Ok(fields) => fields,
            Err(response) => return response,
        };
        let id = self.allocate_id();
        self.products.insert(id, fields.into_record(id));
        FetchResponse::new(200, json!({ "mensaje": "Producto guardado correctamente" }))
    }

    fn update(&mut self, id: u64, request: &FetchRequest) -> FetchResponse {
        let fields = match parse_product_fields(request) {
            Ok(fields) => fields,
            Err(response) => return response,
        };
        // An UPDATE on a missing row touches nothing and still reports success.
        if self.products.contains_key(&id) {
            self.products.insert(id, fields.into_record(id));
        }
        FetchResponse::new(200, json!({ "mensaje": "Producto actualizado" }))
    }

    fn destroy(&mut self, id: u64) -> FetchResponse {
        self.products.remove(&id);
        FetchResponse::new(200, json!({ "mensaje": "Producto eliminado" }))
    }
}

impl Backend for ProductBackend {
    fn handle(&mut self, request: &FetchRequest) -> FetchResponse {
        let path = request.url.split(['?', '#']).next().unwrap_or_default();
        let route = match path.strip_prefix(PRODUCTS_PATH) {
            Some("" | "/") => Route::Collection,
            Some(rest) => match rest.strip_prefix('/').and_then(|id| id.parse::<u64>().ok()) {
                Some(id) => Route::Item(id),
                None => Route::Unknown,
            },
            None => Route::Unknown,
        };

        let response = match (route, request.method) {
            (Route::Collection, Method::Get) => self.list(),
            (Route::Collection, Method::Post) => self.create(request),
            (Route::Item(id), Method::Get) => self.show(id),
            (Route::Item(id), Method::Put) => self.update(id, request),
            (Route::Item(id), Method::Delete) => self.destroy(id),
            _ => not_found("Ruta no encontrada"),
        };
        log::debug!(
            target: "form_harness::network",
            "{request} -> {}",
            response.status
        );
        response
    }
}

#[derive(Debug, Clone, Copy)]
enum Route {
    Collection,
    Item(u64),
    Unknown,
}

struct ProductFields {
    nombre: String,
    precio: Option<f64>,
    descripcion: String,
}

impl ProductFields {
    fn into_record(self, id: u64) -> ProductRecord {
        ProductRecord {
            id,
            nombre: self.nombre,
            precio: self.precio,
            descripcion: self.descripcion,
        }
    }
}

// Malformed JSON is a client error; a body missing any of the three fields
// blows up server-side and surfaces as 500.
fn parse_product_fields(request: &FetchRequest) -> std::result::Result<ProductFields, FetchResponse> {
    let body = request.body.as_deref().unwrap_or_default();
    let value: Value = serde_json::from_str(body).map_err(|err| {
        FetchResponse::new(400, json!({ "error": format!("JSON inválido: {err}") }))
    })?;

    let missing = |field: &str| {
        FetchResponse::new(500, json!({ "error": format!("Falta el campo '{field}'") }))
    };
    let object = value.as_object().ok_or_else(|| missing("nombre"))?;
    let nombre = object.get("nombre").ok_or_else(|| missing("nombre"))?;
    let precio = object.get("precio").ok_or_else(|| missing("precio"))?;
    let descripcion = object
        .get("descripcion")
        .ok_or_else(|| missing("descripcion"))?;

    Ok(ProductFields {
        nombre: json_text(nombre),
        precio: precio.as_f64(),
        descripcion: json_text(descripcion),
    })
}

fn json_text(value: &Value) -> String {
    match value {
        Value::String(text) => text.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

fn not_found(message: &str) -> FetchResponse {
    FetchResponse::new(404, json!({ "error": message }))
}
