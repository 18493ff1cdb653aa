//! The product page logic driven by the harness.
//!
//! [`ProductCrud`] is the contract test scenarios exercise; [`ProductForm`] is
//! the page script itself, wired to the fixture through listeners and fetches.

use std::cell::RefCell;
use std::rc::Rc;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::core_dom_utils::{format_float, parse_float};
use crate::element::ElementHandle;
use crate::fixture::{DESCRIPCION_ID, NOMBRE_ID, PRECIO_ID, SAVE_BUTTON_ID};
use crate::harness::Harness;
use crate::network::{FetchRequest, FetchResponse, Method};
use crate::{Error, Result};

const PRODUCTS_URL: &str = "/productos";
const CONFIRM_DELETE: &str = "¿Seguro que deseas eliminar este producto?";
const NOT_FOUND_MESSAGE: &str = "Producto no encontrado";

/// Body sent on create and update. A `NaN` price serializes as `null`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Product {
    pub nombre: String,
    pub precio: f64,
    pub descripcion: String,
}

/// A stored product as the backend reports it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProductRecord {
    pub id: u64,
    pub nombre: String,
    pub precio: Option<f64>,
    #[serde(default)]
    pub descripcion: String,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct FormState {
    pub editing_id: Option<u64>,
    pub productos: Vec<ProductRecord>,
}

/// Operations the product page exposes to its buttons and to tests.
pub trait ProductCrud {
    /// Empties the three inputs and leaves edit mode.
    fn limpiar_formulario(&self, h: &mut Harness) -> Result<()>;

    /// Creates, or updates the product being edited, from the input values.
    fn guardar_producto(&self, h: &mut Harness) -> Result<()>;

    fn editar_producto(&self, h: &mut Harness, id: u64) -> Result<()>;

    /// Deletes after the user confirms.
    fn eliminar_producto(&self, h: &mut Harness, id: u64) -> Result<()>;
}

#[derive(Debug, Clone, Default)]
pub struct ProductForm {
    state: Rc<RefCell<FormState>>,
}

impl ProductForm {
    pub fn new() -> Self {
        Self::default()
    }

    /// Binds the save button and loads the table.
    pub fn mount(&self, h: &mut Harness) -> Result<()> {
        let save = field(h, SAVE_BUTTON_ID)?;
        let form = self.clone();
        h.add_event_listener(save, "click", move |h, _| form.guardar_producto(h))?;
        self.cargar_productos(h)
    }

    /// Requests the product list; the table is rebuilt when it arrives.
    pub fn cargar_productos(&self, h: &mut Harness) -> Result<()> {
        let form = self.clone();
        h.fetch(FetchRequest::get(PRODUCTS_URL), move |h, response| {
            form.render_products(h, &response)
        });
        Ok(())
    }

    pub fn editing_id(&self) -> Option<u64> {
        self.state.borrow().editing_id
    }

    pub fn set_editing_id(&self, id: Option<u64>) {
        self.state.borrow_mut().editing_id = id;
    }

    /// Records from the most recent list response.
    pub fn productos(&self) -> Vec<ProductRecord> {
        self.state.borrow().productos.clone()
    }

    pub fn state(&self) -> FormState {
        self.state.borrow().clone()
    }

    fn render_products(&self, h: &mut Harness, response: &FetchResponse) -> Result<()> {
        if !response.ok() {
            let text = response_message(response)?;
            log::warn!(target: "form_harness::crud", "listing products failed: {text}");
            return h.dom_mut().set_message(&text);
        }
        let productos: Vec<ProductRecord> = response.json()?;

        h.dom_mut().clear_rows()?;
        for producto in &productos {
            let id = producto.id.to_string();
            let precio = precio_text(producto.precio);
            let row = h.dom_mut().append_row(&[
                id.as_str(),
                producto.nombre.as_str(),
                precio.as_str(),
                producto.descripcion.as_str(),
            ])?;
            self.append_actions(h, row, producto.id)?;
        }
        log::debug!(
            target: "form_harness::crud",
            "rendered {} product rows",
            productos.len()
        );
        self.state.borrow_mut().productos = productos;
        Ok(())
    }

    fn append_actions(&self, h: &mut Harness, row: ElementHandle, id: u64) -> Result<()> {
        let dom = h.dom_mut();
        let cell = dom.create_element("td");
        let edit = dom.create_element_with("button", &[("type", "button")], "Editar");
        let delete = dom.create_element_with("button", &[("type", "button")], "Eliminar");
        dom.append_child(cell, edit)?;
        dom.append_child(cell, delete)?;
        dom.append_child(row, cell)?;

        let form = self.clone();
        h.add_event_listener(edit, "click", move |h, _| form.editar_producto(h, id))?;
        let form = self.clone();
        h.add_event_listener(delete, "click", move |h, _| form.eliminar_producto(h, id))?;
        Ok(())
    }

    fn read_product(h: &Harness) -> Result<Product> {
        let dom = h.dom();
        Ok(Product {
            nombre: dom.value(field(h, NOMBRE_ID)?)?,
            precio: parse_float(&dom.value(field(h, PRECIO_ID)?)?),
            descripcion: dom.value(field(h, DESCRIPCION_ID)?)?,
        })
    }
}

impl ProductCrud for ProductForm {
    fn limpiar_formulario(&self, h: &mut Harness) -> Result<()> {
        for id in [NOMBRE_ID, PRECIO_ID, DESCRIPCION_ID] {
            let input = field(h, id)?;
            h.dom_mut().set_value(input, "")?;
        }
        self.set_editing_id(None);
        Ok(())
    }

    fn guardar_producto(&self, h: &mut Harness) -> Result<()> {
        let producto = Self::read_product(h)?;
        let request = match self.editing_id() {
            Some(id) => {
                FetchRequest::with_json(Method::Put, &format!("{PRODUCTS_URL}/{id}"), &producto)?
            }
            None => FetchRequest::with_json(Method::Post, PRODUCTS_URL, &producto)?,
        };

        let form = self.clone();
        h.fetch(request, move |h, response| {
            let text = response_message(&response)?;
            h.dom_mut().set_message(&text)?;
            if response.ok() {
                form.limpiar_formulario(h)?;
                form.cargar_productos(h)?;
            }
            Ok(())
        });
        Ok(())
    }

    fn editar_producto(&self, h: &mut Harness, id: u64) -> Result<()> {
        let found = self
            .state
            .borrow()
            .productos
            .iter()
            .find(|producto| producto.id == id)
            .cloned();
        let Some(producto) = found else {
            return h.dom_mut().set_message(NOT_FOUND_MESSAGE);
        };

        let nombre = field(h, NOMBRE_ID)?;
        let precio = field(h, PRECIO_ID)?;
        let descripcion = field(h, DESCRIPCION_ID)?;
        let dom = h.dom_mut();
        dom.set_value(nombre, &producto.nombre)?;
        dom.set_value(precio, &producto.precio.map(format_float).unwrap_or_default())?;
        dom.set_value(descripcion, &producto.descripcion)?;
        self.set_editing_id(Some(id));
        Ok(())
    }

    fn eliminar_producto(&self, h: &mut Harness, id: u64) -> Result<()> {
        if !h.confirm(CONFIRM_DELETE) {
            return Ok(());
        }
        let form = self.clone();
        h.fetch(
            FetchRequest::delete(&format!("{PRODUCTS_URL}/{id}")),
            move |h, response| {
                let text = response_message(&response)?;
                h.dom_mut().set_message(&text)?;
                form.cargar_productos(h)
            },
        );
        Ok(())
    }
}

fn field(h: &Harness, id: &str) -> Result<ElementHandle> {
    h.dom()
        .get_element_by_id(id)
        .ok_or_else(|| Error::SelectorNotFound(format!("#{id}")))
}

// `mensaje` on success, `error` otherwise.
fn response_message(response: &FetchResponse) -> Result<String> {
    let body: Value = response.json()?;
    let text = body
        .get("mensaje")
        .or_else(|| body.get("error"))
        .and_then(Value::as_str)
        .map(str::to_string)
        .unwrap_or_else(|| format!("Error {}", response.status));
    Ok(text)
}

fn precio_text(precio: Option<f64>) -> String {
    match precio {
        Some(value) => format_float(value),
        None => "null".to_string(),
    }
}
