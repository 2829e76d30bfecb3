//! Scripted stand-ins for a live page, used by unit tests across the crate.

use std::cell::{Cell, RefCell};
use std::collections::{HashMap, VecDeque};
use std::io::Cursor;
use std::time::Duration;

use image::{ImageFormat, Rgb, RgbImage};

use crate::error::{Result, ScrapeError};
use crate::page::{Clock, ElementRef, Locator, PageAccessor, ScrollSurface};

/// Virtual time: `sleep` advances the clock instantly.
#[derive(Debug, Default)]
pub struct ManualClock {
    now: Cell<Duration>,
    sleeps: Cell<usize>,
}

impl ManualClock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sleeps(&self) -> usize {
        self.sleeps.get()
    }
}

impl Clock for ManualClock {
    fn elapsed(&self) -> Duration {
        self.now.get()
    }

    async fn sleep(&self, duration: Duration) {
        self.now.set(self.now.get() + duration);
        self.sleeps.set(self.sleeps.get() + 1);
    }
}

/// Solid-colour PNG bytes.
pub fn png(width: u32, height: u32, shade: u8) -> Vec<u8> {
    let img = RgbImage::from_pixel(width, height, Rgb([shade, shade, shade]));
    let mut out = Cursor::new(Vec::new());
    img.write_to(&mut out, ImageFormat::Png).unwrap();
    out.into_inner()
}

/// Pops scripted values in order, repeating the last one once exhausted.
#[derive(Debug, Default)]
struct Script<T: Copy> {
    queue: VecDeque<T>,
    last: Option<T>,
}

impl<T: Copy> Script<T> {
    fn new(values: &[T]) -> Self {
        Self {
            queue: values.iter().copied().collect(),
            last: None,
        }
    }

    fn next(&mut self) -> Option<T> {
        if let Some(v) = self.queue.pop_front() {
            self.last = Some(v);
        }
        self.last
    }
}

/// A single scrollable region with scripted extents and viewport captures.
#[derive(Debug)]
pub struct ScriptedSurface {
    extents: RefCell<Script<u64>>,
    tile_heights: RefCell<Script<u32>>,
    width: u32,
    dpr: f64,
    pub reads: Cell<usize>,
    pub drives: RefCell<Vec<u64>>,
    pub captures: Cell<usize>,
}

impl ScriptedSurface {
    pub fn new(extents: &[u64]) -> Self {
        Self {
            extents: RefCell::new(Script::new(extents)),
            tile_heights: RefCell::new(Script::new(&[100])),
            width: 40,
            dpr: 1.0,
            reads: Cell::new(0),
            drives: RefCell::new(Vec::new()),
            captures: Cell::new(0),
        }
    }

    pub fn with_tiles(mut self, width: u32, heights: &[u32], dpr: f64) -> Self {
        self.width = width;
        self.tile_heights = RefCell::new(Script::new(heights));
        self.dpr = dpr;
        self
    }
}

impl ScrollSurface for ScriptedSurface {
    async fn extent(&self, _region: &ElementRef) -> Result<u64> {
        self.reads.set(self.reads.get() + 1);
        Ok(self.extents.borrow_mut().next().unwrap_or(0))
    }

    async fn drive_to(&self, _region: &ElementRef, offset: u64) -> Result<()> {
        self.drives.borrow_mut().push(offset);
        Ok(())
    }

    async fn capture_bitmap(&self, _region: &ElementRef) -> Result<Vec<u8>> {
        let height = self.tile_heights.borrow_mut().next().unwrap_or(0);
        let index = self.captures.get();
        self.captures.set(index + 1);
        if height == 0 {
            return Ok(Vec::new());
        }
        Ok(png(self.width, height, (index as u8).wrapping_add(1).wrapping_mul(10)))
    }

    async fn device_pixel_ratio(&self) -> Result<f64> {
        Ok(self.dpr)
    }
}

#[derive(Debug, Clone)]
struct FakeElement {
    text: String,
    attrs: HashMap<String, String>,
    children: Vec<ElementRef>,
    displayed: bool,
}

/// An in-memory page: elements by id, locator placements, scripted extents.
///
/// Every element exists at once; clicks are recorded but change nothing.
#[derive(Debug, Default)]
pub struct FakePage {
    elements: RefCell<HashMap<String, FakeElement>>,
    placements: RefCell<HashMap<Locator, Vec<ElementRef>>>,
    extents: RefCell<HashMap<String, Script<u64>>>,
    markup: RefCell<String>,
    pub navigations: RefCell<Vec<String>>,
    pub clicks: RefCell<Vec<String>>,
    pub typed: RefCell<Vec<(String, String)>>,
    pub drives: RefCell<Vec<(String, u64)>>,
    pub quit_called: Cell<bool>,
}

pub struct FakeElementBuilder<'a> {
    page: &'a FakePage,
    id: String,
}

impl FakeElementBuilder<'_> {
    fn edit(&self, f: impl FnOnce(&mut FakeElement)) {
        if let Some(el) = self.page.elements.borrow_mut().get_mut(&self.id) {
            f(el);
        }
    }

    pub fn attr(self, name: &str, value: &str) -> Self {
        self.edit(|el| {
            el.attrs.insert(name.to_string(), value.to_string());
        });
        self
    }

    pub fn class(self, value: &str) -> Self {
        self.attr("class", value)
    }

    pub fn hidden(self) -> Self {
        self.edit(|el| el.displayed = false);
        self
    }

    pub fn children(self, ids: &[&str]) -> Self {
        self.edit(|el| el.children = ids.iter().map(|i| ElementRef(i.to_string())).collect());
        self
    }
}

impl FakePage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn element(&self, id: &str, text: &str) -> FakeElementBuilder<'_> {
        self.elements.borrow_mut().insert(
            id.to_string(),
            FakeElement {
                text: text.to_string(),
                attrs: HashMap::new(),
                children: Vec::new(),
                displayed: true,
            },
        );
        FakeElementBuilder {
            page: self,
            id: id.to_string(),
        }
    }

    /// Make `locator` resolve to `ids`, in order.
    pub fn place(&self, locator: Locator, ids: &[&str]) {
        self.placements.borrow_mut().insert(
            locator,
            ids.iter().map(|i| ElementRef(i.to_string())).collect(),
        );
    }

    pub fn script_extents(&self, id: &str, extents: &[u64]) {
        self.extents
            .borrow_mut()
            .insert(id.to_string(), Script::new(extents));
    }

    pub fn set_markup(&self, markup: &str) {
        *self.markup.borrow_mut() = markup.to_string();
    }

    fn get(&self, element: &ElementRef) -> Result<FakeElement> {
        self.elements
            .borrow()
            .get(&element.0)
            .cloned()
            .ok_or_else(|| ScrapeError::not_found(format!("stale element {element}")))
    }
}

impl ScrollSurface for FakePage {
    async fn extent(&self, region: &ElementRef) -> Result<u64> {
        Ok(self
            .extents
            .borrow_mut()
            .get_mut(&region.0)
            .and_then(|s| s.next())
            .unwrap_or(0))
    }

    async fn drive_to(&self, region: &ElementRef, offset: u64) -> Result<()> {
        self.drives.borrow_mut().push((region.0.clone(), offset));
        Ok(())
    }

    async fn capture_bitmap(&self, _region: &ElementRef) -> Result<Vec<u8>> {
        Ok(png(40, 100, 200))
    }

    async fn device_pixel_ratio(&self) -> Result<f64> {
        Ok(1.0)
    }
}

impl PageAccessor for FakePage {
    async fn navigate(&self, url: &str) -> Result<()> {
        self.navigations.borrow_mut().push(url.to_string());
        Ok(())
    }

    async fn locate_all(&self, locator: &Locator) -> Result<Vec<ElementRef>> {
        Ok(self
            .placements
            .borrow()
            .get(locator)
            .cloned()
            .unwrap_or_default())
    }

    async fn children(&self, element: &ElementRef) -> Result<Vec<ElementRef>> {
        Ok(self.get(element)?.children)
    }

    async fn text(&self, element: &ElementRef) -> Result<String> {
        Ok(self.get(element)?.text)
    }

    async fn attribute(&self, element: &ElementRef, name: &str) -> Result<Option<String>> {
        Ok(self.get(element)?.attrs.get(name).cloned())
    }

    async fn is_displayed(&self, element: &ElementRef) -> Result<bool> {
        Ok(self.get(element)?.displayed)
    }

    async fn click(&self, element: &ElementRef) -> Result<()> {
        self.get(element)?;
        self.clicks.borrow_mut().push(element.0.clone());
        Ok(())
    }

    async fn type_text(&self, element: &ElementRef, text: &str) -> Result<()> {
        self.typed
            .borrow_mut()
            .push((element.0.clone(), text.to_string()));
        Ok(())
    }

    async fn markup_snapshot(&self) -> Result<String> {
        Ok(self.markup.borrow().clone())
    }

    async fn quit(&self) -> Result<()> {
        self.quit_called.set(true);
        Ok(())
    }
}
