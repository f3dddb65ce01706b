//! Request handlers for the phone book pages and endpoints.
//!
//! Every handler that touches the contact book holds the book's lock for the
//! whole read or mutate-then-save sequence, so positional ids seen by one
//! request are never shifted underneath it by another.

use std::sync::{Arc, MutexGuard};

use log::{debug, error, info, warn};
use serde_json::json;

use crate::contact::Contact;
use crate::error::AppError;
use crate::http::{Request, Response};
use crate::image::ImageFormat;
use crate::multipart;
use crate::router::Router;
use crate::server::ServerStats;
use crate::store::{ContactBook, SharedBook};
use crate::templates::TemplateEngine;
use crate::utils::{cache_buster, parse_form_body, parse_query_params};

pub const ADD_SUCCESS: &str = "/?message=Contact+added+successfully";
pub const ADD_ERROR: &str = "/?message=Error+adding+contact";
pub const DELETE_SUCCESS: &str = "/?message=Contact+deleted+successfully";
pub const DELETE_ERROR: &str = "/?message=Error+deleting+contact";

pub const STYLESHEET_PATH: &str = "/_phonebook/static/styles.css";

/// Register every phone book route.
pub fn register_routes(router: &mut Router, book: SharedBook, stats: Option<Arc<ServerStats>>) {
    let home_book = book.clone();
    router.register_exact(
        "GET",
        "/",
        Box::new(move |req: &Request| handle_home(req, &home_book)),
    );

    let add_book = book.clone();
    router.register_exact(
        "POST",
        "/add",
        Box::new(move |req: &Request| handle_add(req, &add_book)),
    );

    let search_book = book.clone();
    router.register_exact(
        "GET",
        "/search",
        Box::new(move |req: &Request| handle_search(req, &search_book)),
    );

    let delete_book = book.clone();
    router.register_exact(
        "POST",
        "/delete",
        Box::new(move |req: &Request| handle_delete(req, &delete_book)),
    );

    let image_book = book.clone();
    router.register_exact(
        "GET",
        "/image",
        Box::new(move |req: &Request| handle_image(req, &image_book)),
    );

    router.register_exact(
        "GET",
        "/_health",
        Box::new(move |_| handle_health(&book, stats.as_deref())),
    );

    router.register_exact("GET", STYLESHEET_PATH, Box::new(|_| handle_stylesheet()));
}

/// Lock the book. A panic in another handler poisons the mutex, but every
/// book mutation is a single `Vec` operation, so the data is still whole and
/// the guard is recovered.
fn lock(book: &SharedBook) -> MutexGuard<'_, ContactBook> {
    book.lock().unwrap_or_else(|poisoned| {
        warn!("Contact book lock was poisoned by a panicked handler, recovering");
        poisoned.into_inner()
    })
}

fn handle_home(req: &Request, book: &SharedBook) -> Result<Response, AppError> {
    let params = parse_query_params(&req.path);
    let message = params.get("message").map(String::as_str);

    let book = lock(book);
    let html = TemplateEngine::new().render_home(book.contacts(), message, cache_buster())?;
    Ok(Response::html(html))
}

/// Fields of an add-contact submission
struct Submission {
    name: String,
    phone: String,
    cell_phone: String,
    photo: Option<Vec<u8>>,
}

impl Submission {
    fn is_complete(&self) -> bool {
        !self.name.is_empty() && !self.phone.is_empty() && !self.cell_phone.is_empty()
    }

    fn into_contact(self) -> Contact {
        let mut contact = Contact::new(self.name, self.phone, self.cell_phone);
        contact.set_photo(self.photo.as_deref());
        contact
    }
}

/// Read the add form from either a multipart or a URL-encoded body.
fn read_submission(req: &Request) -> Option<Submission> {
    let content_type = req.header("content-type").unwrap_or("");

    if content_type
        .to_ascii_lowercase()
        .starts_with("multipart/form-data")
    {
        let Some(boundary) = multipart::extract_boundary(content_type) else {
            warn!("Multipart submission without boundary");
            return None;
        };

        let form = multipart::parse(req.body(), &boundary);
        if !form.is_complete() {
            debug!("Add form had {} unreadable parts", form.skipped().len());
        }

        let text = |name: &str| form.text_utf8(name).unwrap_or_default();
        // An empty file input arrives as a text part and means no photo.
        let photo = form.file("photo").map(<[u8]>::to_vec);

        return Some(Submission {
            name: text("name"),
            phone: text("phone"),
            cell_phone: text("cellPhone"),
            photo,
        });
    }

    let mut fields = parse_form_body(req.body());
    let mut take = |name: &str| fields.remove(name).unwrap_or_default();
    Some(Submission {
        name: take("name"),
        phone: take("phone"),
        cell_phone: take("cellPhone"),
        photo: None,
    })
}

fn handle_add(req: &Request, book: &SharedBook) -> Result<Response, AppError> {
    let Some(submission) = read_submission(req).filter(Submission::is_complete) else {
        info!("Rejected incomplete contact submission");
        return Ok(Response::redirect(ADD_ERROR));
    };

    let contact = submission.into_contact();
    if contact.has_photo() {
        debug!(
            "Adding photo for contact: {} ({} bytes)",
            contact.name(),
            contact.photo_len()
        );
    }

    let mut book = lock(book);
    let id = book.append(contact);
    match book.save() {
        Ok(()) => {
            info!("Added contact {id}");
            Ok(Response::redirect(ADD_SUCCESS))
        }
        Err(e) => {
            error!("Failed to save contacts to {}: {e}", book.describe());
            Ok(Response::redirect(ADD_ERROR))
        }
    }
}

fn handle_search(req: &Request, book: &SharedBook) -> Result<Response, AppError> {
    let params = parse_query_params(&req.path);
    let query = params
        .get("query")
        .map(|q| q.to_lowercase())
        .unwrap_or_default();

    let book = lock(book);
    let hits = book.search(&query);
    debug!("Search '{query}' matched {} contacts", hits.len());

    let html = TemplateEngine::new().render_search(&query, &hits, cache_buster())?;
    Ok(Response::html(html))
}

fn handle_delete(req: &Request, book: &SharedBook) -> Result<Response, AppError> {
    let fields = parse_form_body(req.body());
    let raw_id = fields.get("id").map(String::as_str).unwrap_or("");

    let id = match ContactBook::parse_id(raw_id) {
        Ok(id) => id,
        Err(e) => {
            info!("Delete rejected: {e}");
            return Ok(Response::redirect(DELETE_ERROR));
        }
    };

    let mut book = lock(book);
    let removed = match book.remove_at(id) {
        Ok(contact) => contact,
        Err(e) => {
            info!("Delete rejected: {e}");
            return Ok(Response::redirect(DELETE_ERROR));
        }
    };

    match book.save() {
        Ok(()) => {
            info!("Deleted contact {id}: {removed}");
            Ok(Response::redirect(DELETE_SUCCESS))
        }
        Err(e) => {
            error!("Failed to save contacts to {}: {e}", book.describe());
            Ok(Response::redirect(DELETE_ERROR))
        }
    }
}

fn handle_image(req: &Request, book: &SharedBook) -> Result<Response, AppError> {
    let params = parse_query_params(&req.path);
    let raw_id = params.get("id").map(String::as_str).unwrap_or("");
    let id = ContactBook::parse_id(raw_id).map_err(|_| AppError::NotFound)?;

    let photo = {
        let book = lock(book);
        book.get(id).and_then(Contact::photo)
    };
    let photo = photo.ok_or(AppError::NotFound)?;

    let format = ImageFormat::detect(&photo);
    debug!("Serving {format} image for contact {id} ({} bytes)", photo.len());

    Ok(Response::binary(format.mime_type(), photo)
        .with_header("Cache-Control", "no-cache, no-store, must-revalidate")
        .with_header("Pragma", "no-cache")
        .with_header("Expires", "0"))
}

fn handle_health(book: &SharedBook, stats: Option<&ServerStats>) -> Result<Response, AppError> {
    let contacts = lock(book).len();

    let mut health = json!({
        "status": "healthy",
        "service": env!("CARGO_PKG_NAME"),
        "version": env!("CARGO_PKG_VERSION"),
        "contacts": contacts,
    });

    if let Some(stats) = stats {
        let (total, successful, errors, bytes, uptime) = stats.get_stats();
        health["requests"] = json!({
            "total": total,
            "successful": successful,
            "errors": errors,
            "bytes_served": bytes,
        });
        health["uptime_secs"] = json!(uptime.as_secs());
    }

    Ok(Response::json(health.to_string()))
}

fn handle_stylesheet() -> Result<Response, AppError> {
    let engine = TemplateEngine::new();
    let (content, content_type) = engine
        .get_static_asset("styles.css")
        .ok_or(AppError::NotFound)?;

    Ok(Response::binary(content_type, content.as_bytes().to_vec())
        .with_header("Cache-Control", "public, max-age=3600"))
}
