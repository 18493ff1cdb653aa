//! The canonical product form page and the row/message helpers the CRUD
//! logic drives it with.

use crate::dom::Dom;
use crate::element::ElementHandle;
use crate::{Error, Result};

pub const NOMBRE_ID: &str = "nombre";
pub const PRECIO_ID: &str = "precio";
pub const DESCRIPCION_ID: &str = "descripcion";
pub const SAVE_BUTTON_ID: &str = "guardar";
pub const MESSAGE_ID: &str = "message";
pub const TABLE_ID: &str = "tabla-productos";
pub const PRODUCT_ROWS_SELECTOR: &str = "#tabla-productos tbody tr";

const TBODY_SELECTOR: &str = "#tabla-productos tbody";
const TABLE_HEADERS: [&str; 5] = ["ID", "Nombre", "Precio", "Descripción", "Acciones"];

impl Dom {
    /// Builds the product page:
    ///
    /// ```text
    /// h1 "Añadir Producto"
    /// form#producto-form
    ///   label + input#nombre, label + input#precio, label + input#descripcion
    ///   button#guardar "Guardar"
    /// div#message
    /// table#tabla-productos > thead (5 headers), tbody
    /// ```
    pub fn build_fixture() -> Result<Self> {
        let mut dom = Self::new();
        let body = dom.body();

        let heading = dom.create_element_with("h1", &[], "Añadir Producto");
        dom.append_child(body, heading)?;

        let form = dom.create_element_with("form", &[("id", "producto-form")], "");
        dom.append_child(body, form)?;
        for (id, label, kind) in [
            (NOMBRE_ID, "Nombre", "text"),
            (PRECIO_ID, "Precio", "number"),
            (DESCRIPCION_ID, "Descripción", "text"),
        ] {
            let label = dom.create_element_with("label", &[("for", id)], label);
            dom.append_child(form, label)?;
            let input = dom.create_element_with("input", &[("id", id), ("type", kind)], "");
            dom.append_child(form, input)?;
        }
        let save = dom.create_element_with(
            "button",
            &[("id", SAVE_BUTTON_ID), ("type", "button")],
            "Guardar",
        );
        dom.append_child(form, save)?;

        let message = dom.create_element_with("div", &[("id", MESSAGE_ID)], "");
        dom.append_child(body, message)?;

        let table = dom.create_element_with("table", &[("id", TABLE_ID)], "");
        dom.append_child(body, table)?;
        let thead = dom.create_element("thead");
        dom.append_child(table, thead)?;
        let header_row = dom.create_element("tr");
        dom.append_child(thead, header_row)?;
        for header in TABLE_HEADERS {
            let th = dom.create_element_with("th", &[], header);
            dom.append_child(header_row, th)?;
        }
        let tbody = dom.create_element("tbody");
        dom.append_child(table, tbody)?;

        Ok(dom)
    }

    /// Appends a `tr` with one `td` per cell to the product table body.
    pub fn append_row(&mut self, cells: &[&str]) -> Result<ElementHandle> {
        let tbody = self.table_body()?;
        let row = self.create_element("tr");
        for cell in cells {
            let td = self.create_element_with("td", &[], cell);
            self.append_child(row, td)?;
        }
        self.append_child(tbody, row)?;
        Ok(row)
    }

    /// Removes every row whose cell texts satisfy `predicate`, returning how
    /// many were removed.
    pub fn remove_rows<F>(&mut self, mut predicate: F) -> Result<usize>
    where
        F: FnMut(&[String]) -> bool,
    {
        let mut removed = 0usize;
        for row in self.rows()? {
            let cells = self.row_cells(row)?;
            if predicate(&cells) {
                self.remove(row)?;
                removed += 1;
            }
        }
        Ok(removed)
    }

    pub fn clear_rows(&mut self) -> Result<usize> {
        self.remove_rows(|_| true)
    }

    pub fn rows(&self) -> Result<Vec<ElementHandle>> {
        self.query_selector_all(PRODUCT_ROWS_SELECTOR)
    }

    /// Text of each direct `td`/`th` child of `row`.
    pub fn row_cells(&self, row: ElementHandle) -> Result<Vec<String>> {
        let mut cells = Vec::new();
        for child in self.children(row)? {
            let tag = self.tag_name(child)?;
            if tag == "td" || tag == "th" {
                cells.push(self.text_content(child)?);
            }
        }
        Ok(cells)
    }

    pub fn set_message(&mut self, text: &str) -> Result<()> {
        let message = self
            .get_element_by_id(MESSAGE_ID)
            .ok_or_else(|| Error::SelectorNotFound(format!("#{MESSAGE_ID}")))?;
        self.set_text_content(message, text)
    }

    pub fn message(&self) -> Result<String> {
        let message = self
            .get_element_by_id(MESSAGE_ID)
            .ok_or_else(|| Error::SelectorNotFound(format!("#{MESSAGE_ID}")))?;
        self.text_content(message)
    }

    fn table_body(&self) -> Result<ElementHandle> {
        self.query_selector(TBODY_SELECTOR)?
            .ok_or_else(|| Error::SelectorNotFound(TBODY_SELECTOR.into()))
    }
}
