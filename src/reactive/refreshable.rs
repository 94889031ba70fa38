//! Refreshable UI: functions whose output can be rebuilt in place.
//!
//! Calling a refreshable creates an anchor container (`refreshable` tag) in
//! the current slot and renders the function into it. Every call is
//! recorded as a target `(container, arguments)`. [`Refreshable::refresh`]
//! replays every live target: the container is cleared and the function runs
//! again inside it, so siblings of the container are never disturbed and the
//! output always sits at the same position.
//!
//! Rebuilt output always gets fresh element ids; the old subtree is torn
//! down with its teardown hooks.

use std::cell::RefCell;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::rc::Rc;

use super::arguments::{Arguments, BoundArguments};
use crate::element::Element;
use crate::error::{Error, Result};
use crate::ui::Ui;

/// Tag of the anchor container every call creates.
pub const ANCHOR_TAG: &str = "refreshable";
/// Tag of the detached element async refreshes render into.
const STAGING_TAG: &str = "refreshable-staging";

// ---------------------------------------------------------------------------
// Targets
// ---------------------------------------------------------------------------

#[derive(Clone)]
struct RefreshTarget {
    container: Element,
    arguments: Arguments,
}

/// The per-instance bookkeeping shared by both flavors.
struct Targets {
    name: String,
    params: Vec<String>,
    targets: RefCell<Vec<RefreshTarget>>,
}

impl Targets {
    fn new(name: &str, params: &[&str]) -> Self {
        Self {
            name: name.to_owned(),
            params: params.iter().map(|p| (*p).to_owned()).collect(),
            targets: RefCell::new(Vec::new()),
        }
    }

    fn bind(&self, args: &Arguments) -> Result<BoundArguments> {
        args.bind(&self.name, &self.params)
    }

    fn record(&self, container: Element, arguments: Arguments) {
        self.targets.borrow_mut().push(RefreshTarget {
            container,
            arguments,
        });
    }

    fn prune(&self) -> usize {
        let mut targets = self.targets.borrow_mut();
        let before = targets.len();
        targets.retain(|target| {
            let alive = target.container.exists();
            if !alive {
                tracing::debug!(
                    function = %self.name,
                    container = %target.container.id(),
                    "dropping refresh target whose container is gone"
                );
            }
            alive
        });
        before - targets.len()
    }

    /// Merge and bind `args` against every live target.
    ///
    /// Either every target binds or nothing is touched. On success the merged
    /// arguments are recorded for the next refresh.
    fn plan(&self, args: &Arguments) -> Result<Vec<(Element, BoundArguments)>> {
        self.prune();
        let mut targets = self.targets.borrow_mut();
        let merged: Vec<Arguments> = targets.iter().map(|t| t.arguments.merged(args)).collect();
        let bound = merged
            .iter()
            .map(|arguments| self.bind(arguments))
            .collect::<Result<Vec<_>>>()?;
        let mut plan = Vec::with_capacity(targets.len());
        for ((target, arguments), bound) in targets.iter_mut().zip(merged).zip(bound) {
            target.arguments = arguments;
            plan.push((target.container.clone(), bound));
        }
        Ok(plan)
    }

    fn len(&self) -> usize {
        self.targets.borrow().len()
    }
}

/// Remember the first error, keep going.
fn keep_first(first: &mut Option<Error>, result: Result<()>) {
    if let Err(err) = result {
        first.get_or_insert(err);
    }
}

// ---------------------------------------------------------------------------
// Refreshable
// ---------------------------------------------------------------------------

type RenderFn<R> = Rc<dyn Fn(&Ui, &BoundArguments) -> Result<R>>;

/// A synchronous UI function that can be re-run in place.
///
/// ```ignore
/// let counter = Refreshable::new("counter", &["value"], |ui, args| {
///     let value: i64 = args.decode("value")?;
///     ui.element("label")?.set_text(&format!("value={value}"))?;
///     Ok(())
/// });
/// counter.call(&ui, Arguments::new().arg(0))?;
/// counter.refresh(Arguments::new().arg(1))?;
/// ```
pub struct Refreshable<R: 'static = ()> {
    targets: Rc<Targets>,
    render: RenderFn<R>,
}

impl<R: 'static> Clone for Refreshable<R> {
    fn clone(&self) -> Self {
        Self {
            targets: self.targets.clone(),
            render: self.render.clone(),
        }
    }
}

impl<R: 'static> Refreshable<R> {
    /// Wrap `render`, which declares the parameter names `params`.
    pub fn new<F>(name: &str, params: &[&str], render: F) -> Self
    where
        F: Fn(&Ui, &BoundArguments) -> Result<R> + 'static,
    {
        Self {
            targets: Rc::new(Targets::new(name, params)),
            render: Rc::new(render),
        }
    }

    /// Render into a new anchor in the current slot and record the target.
    pub fn call(&self, ui: &Ui, args: Arguments) -> Result<R> {
        let bound = self.targets.bind(&args)?;
        let container = ui.element(ANCHOR_TAG)?;
        self.targets.record(container.clone(), args);
        (self.render)(&ui.fork(container.default_slot()), &bound)
    }

    /// Re-run every live target with `args` merged into its recorded arguments.
    ///
    /// Fails with [`Error::Binding`] before any output is touched if any
    /// target cannot bind. A failing render does not stop the other targets;
    /// the first failure is returned.
    pub fn refresh(&self, args: Arguments) -> Result<()> {
        let plan = self.targets.plan(&args)?;
        let mut first = None;
        for (container, bound) in plan {
            // An earlier render may have removed this one.
            if !container.exists() {
                continue;
            }
            keep_first(&mut first, self.rerender(&container, &bound));
        }
        first.map_or(Ok(()), Err)
    }

    fn rerender(&self, container: &Element, bound: &BoundArguments) -> Result<()> {
        container.clear()?;
        let ui = container.client().ui().fork(container.default_slot());
        (self.render)(&ui, bound).map(|_| ())
    }

    /// Drop targets whose container no longer exists. Returns how many.
    pub fn prune(&self) -> usize {
        self.targets.prune()
    }

    /// Number of recorded targets (including not yet pruned dead ones).
    pub fn targets(&self) -> usize {
        self.targets.len()
    }
}

impl<R: 'static> fmt::Debug for Refreshable<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Refreshable")
            .field("name", &self.targets.name)
            .field("targets", &self.targets())
            .finish_non_exhaustive()
    }
}

// ---------------------------------------------------------------------------
// AsyncRefreshable
// ---------------------------------------------------------------------------

type LocalFuture<R> = Pin<Box<dyn Future<Output = Result<R>>>>;
type AsyncRenderFn<R> = Rc<dyn Fn(Ui, BoundArguments) -> LocalFuture<R>>;

/// An asynchronous UI function that can be re-run in place.
///
/// A refresh renders into a detached staging element. The previous output
/// stays visible while the function is pending and is swapped for the new
/// output in one step once it completes.
pub struct AsyncRefreshable<R: 'static = ()> {
    targets: Rc<Targets>,
    render: AsyncRenderFn<R>,
}

impl<R: 'static> Clone for AsyncRefreshable<R> {
    fn clone(&self) -> Self {
        Self {
            targets: self.targets.clone(),
            render: self.render.clone(),
        }
    }
}

impl<R: 'static> AsyncRefreshable<R> {
    /// Wrap the async `render`, which declares the parameter names `params`.
    pub fn new<F, Fut>(name: &str, params: &[&str], render: F) -> Self
    where
        F: Fn(Ui, BoundArguments) -> Fut + 'static,
        Fut: Future<Output = Result<R>> + 'static,
    {
        Self {
            targets: Rc::new(Targets::new(name, params)),
            render: Rc::new(move |ui: Ui, args: BoundArguments| -> LocalFuture<R> {
                Box::pin(render(ui, args))
            }),
        }
    }

    /// Render into a new anchor in the current slot and record the target.
    pub async fn call(&self, ui: &Ui, args: Arguments) -> Result<R> {
        let bound = self.targets.bind(&args)?;
        let container = ui.element(ANCHOR_TAG)?;
        self.targets.record(container.clone(), args);
        (self.render)(ui.fork(container.default_slot()), bound).await
    }

    /// Re-run every live target; see [`Refreshable::refresh`].
    ///
    /// Targets are rebuilt one after another. A container deleted while its
    /// render was pending receives nothing; the staged output is discarded.
    pub async fn refresh(&self, args: Arguments) -> Result<()> {
        let plan = self.targets.plan(&args)?;
        let mut first = None;
        for (container, bound) in plan {
            if !container.exists() {
                continue;
            }
            keep_first(&mut first, self.rerender(&container, bound).await);
        }
        first.map_or(Ok(()), Err)
    }

    async fn rerender(&self, container: &Element, bound: BoundArguments) -> Result<()> {
        let client = container.client().clone();
        let staging = client.ui().detached(STAGING_TAG)?;
        let result = (self.render)(client.ui().fork(staging.default_slot()), bound).await;

        if result.is_err() || !container.exists() {
            if !container.exists() {
                tracing::debug!(
                    function = %self.targets.name,
                    container = %container.id(),
                    "container removed during refresh, discarding output"
                );
            }
            if staging.exists() {
                staging.delete()?;
            }
            return result.map(|_| ());
        }

        container.clear()?;
        for child in staging.children()? {
            child.move_to(container)?;
        }
        staging.delete()
    }

    /// Refresh in a background task on the current `LocalSet`.
    ///
    /// For use from synchronous event handlers. Errors go to the
    /// application's exception handlers.
    pub fn spawn_refresh(&self, args: Arguments) -> tokio::task::JoinHandle<()> {
        let this = self.clone();
        tokio::task::spawn_local(async move {
            let reporter = this
                .targets
                .targets
                .borrow()
                .first()
                .map(|t| t.container.client().clone());
            if let Err(err) = this.refresh(args).await {
                match reporter {
                    Some(client) => client.report(&err),
                    None => tracing::error!(error = %err, "refresh failed"),
                }
            }
        })
    }

    /// Drop targets whose container no longer exists. Returns how many.
    pub fn prune(&self) -> usize {
        self.targets.prune()
    }

    /// Number of recorded targets (including not yet pruned dead ones).
    pub fn targets(&self) -> usize {
        self.targets.len()
    }
}

impl<R: 'static> fmt::Debug for AsyncRefreshable<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AsyncRefreshable")
            .field("name", &self.targets.name)
            .field("targets", &self.targets())
            .finish_non_exhaustive()
    }
}

// ===========================================================================
// Tests
// ===========================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::{App, AppConfig};
    use crate::client::Client;
    use pretty_assertions::assert_eq;
    use std::cell::Cell;
    use tokio::sync::Notify;

    fn setup() -> (App, Client) {
        let app = App::new(AppConfig::default());
        let client = app.new_client(false);
        (app, client)
    }

    fn texts(client: &Client) -> Vec<String> {
        client
            .find_by_tag("label")
            .iter()
            .map(|label| label.text().unwrap())
            .collect()
    }

    fn value_label() -> Refreshable {
        Refreshable::new("some_ui", &["value"], |ui, args| {
            let value: i64 = args.decode("value")?;
            ui.element("label")?.set_text(&format!("value={value}"))?;
            Ok(())
        })
    }

    // ── Call ─────────────────────────────────────────────────────────

    #[test]
    fn call_renders_into_anchor_and_returns_result() {
        let (_app, client) = setup();
        let ui = client.ui();
        let twice = Refreshable::new("twice", &["n"], |_, args| Ok(args.decode::<i64>("n")? * 2));
        assert_eq!(twice.call(&ui, Arguments::new().arg(21)).unwrap(), 42);
        let anchors = client.find_by_tag(ANCHOR_TAG);
        assert_eq!(anchors.len(), 1);
        assert_eq!(anchors[0].parent(), Some(client.root()));
        assert_eq!(twice.targets(), 1);
    }

    #[test]
    fn binding_error_on_call_creates_nothing() {
        let (_app, client) = setup();
        let before = client.len();
        let err = value_label()
            .call(&client.ui(), Arguments::new().arg(1).arg(2))
            .unwrap_err();
        assert!(matches!(err, Error::Binding { .. }));
        assert_eq!(client.len(), before);
    }

    // ── Refresh ──────────────────────────────────────────────────────

    #[test]
    fn refresh_replaces_output_in_place() {
        let (_app, client) = setup();
        let ui = client.ui();
        let header = ui.element("header").unwrap();
        let view = value_label();
        view.call(&ui, Arguments::new().arg(0)).unwrap();
        let footer = ui.element("footer").unwrap();
        let old = client.find_by_tag("label")[0].clone();

        view.refresh(Arguments::new()).unwrap();
        view.refresh(Arguments::new().arg(1)).unwrap();

        assert_eq!(texts(&client), vec!["value=1"]);
        assert!(!old.exists());
        let order: Vec<_> = client.root().children().unwrap();
        assert_eq!(order[0], header);
        assert_eq!(order[1].tag().unwrap(), ANCHOR_TAG);
        assert_eq!(order[2], footer);
    }

    #[test]
    fn inconsistent_keyword_fails_without_touching_output() {
        let (_app, client) = setup();
        let view = value_label();
        view.call(&client.ui(), Arguments::new().arg(0)).unwrap();
        view.refresh(Arguments::new().arg(2)).unwrap();
        let label = client.find_by_tag("label")[0].clone();

        let err = view.refresh(Arguments::new().kwarg("value", 3)).unwrap_err();
        assert_eq!(
            err.to_string(),
            "'value' needs to be consistently passed to some_ui() \
             either as positional or as keyword argument"
        );
        assert!(label.exists());
        assert_eq!(texts(&client), vec!["value=2"]);
    }

    #[test]
    fn keyword_call_accepts_keyword_refresh() {
        let (_app, client) = setup();
        let view = value_label();
        view.call(&client.ui(), Arguments::new().kwarg("value", 1)).unwrap();
        view.refresh(Arguments::new().kwarg("value", 5)).unwrap();
        assert_eq!(texts(&client), vec!["value=5"]);
    }

    #[test]
    fn all_targets_bind_before_any_clears() {
        let (_app, client) = setup();
        let ui = client.ui();
        let view = value_label();
        view.call(&ui, Arguments::new().kwarg("value", 1)).unwrap();
        view.call(&ui, Arguments::new().arg(2)).unwrap();
        let before: Vec<_> = client.find_by_tag("label");

        assert!(view.refresh(Arguments::new().kwarg("value", 9)).is_err());
        assert!(before.iter().all(Element::exists));
    }

    #[test]
    fn dead_targets_are_pruned_not_resurrected() {
        let (_app, client) = setup();
        let ui = client.ui();
        let card = ui.element("q-card").unwrap();
        let renders = Rc::new(Cell::new(0));
        let r = renders.clone();
        let view = Refreshable::new("some_ui", &[], move |ui, _| {
            r.set(r.get() + 1);
            ui.element("label")?.set_text("some text")?;
            Ok(())
        });
        ui.within(&card, |ui| view.call(ui, Arguments::new())).unwrap();
        view.call(&ui, Arguments::new()).unwrap();

        card.clear().unwrap();
        view.refresh(Arguments::new()).unwrap();

        assert_eq!(view.targets(), 1);
        assert_eq!(renders.get(), 3);
        assert!(card.children().unwrap().is_empty());
        assert_eq!(texts(&client), vec!["some text"]);
    }

    #[test]
    fn render_error_does_not_stop_other_targets() {
        let (_app, client) = setup();
        let ui = client.ui();
        let view = Refreshable::new("maybe", &["fail"], |ui, args| {
            ui.element("label")?;
            if args.decode::<bool>("fail")? {
                return Err(Error::handler("render failed"));
            }
            Ok(())
        });
        view.call(&ui, Arguments::new().arg(false)).unwrap();
        view.call(&ui, Arguments::new().arg(false)).unwrap();
        let err = view.refresh(Arguments::new().arg(true)).unwrap_err();
        assert_eq!(err, Error::Handler("render failed".into()));
        assert_eq!(client.find_by_tag("label").len(), 2);
    }

    // ── Async ────────────────────────────────────────────────────────

    #[test]
    fn async_refresh_keeps_old_output_until_ready() {
        tokio_test::block_on(async {
            let (_app, client) = setup();
            let gate = Rc::new(Notify::new());
            let text = Rc::new(RefCell::new("[]".to_string()));
            let (g, t) = (gate.clone(), text.clone());
            let view = AsyncRefreshable::new("numbers", &[], move |ui: Ui, _| {
                let (gate, text) = (g.clone(), t.clone());
                async move {
                    gate.notified().await;
                    let label = ui.element("label")?;
                    label.set_text(&text.borrow())?;
                    Ok::<(), Error>(())
                }
            });

            gate.notify_one();
            view.call(&client.ui(), Arguments::new()).await.unwrap();
            assert_eq!(texts(&client), vec!["[]"]);
            let container = client.find_by_tag(ANCHOR_TAG)[0].clone();

            *text.borrow_mut() = "[1]".to_string();
            let observer = async {
                tokio::task::yield_now().await;
                // Render is pending: the old label is still the only child.
                let children = container.children().unwrap();
                assert_eq!(children.len(), 1);
                assert_eq!(children[0].text().unwrap(), "[]");
                gate.notify_one();
            };
            let (result, ()) = tokio::join!(view.refresh(Arguments::new()), observer);
            result.unwrap();

            let children = container.children().unwrap();
            assert_eq!(children.len(), 1);
            assert_eq!(children[0].text().unwrap(), "[1]");
            assert!(client.find_by_tag(STAGING_TAG).is_empty());
        });
    }

    #[test]
    fn async_refresh_sends_only_spliced_output() {
        tokio_test::block_on(async {
            let (app, client) = setup();
            let gate = Rc::new(Notify::new());
            let g = gate.clone();
            let view = AsyncRefreshable::new("fresh", &[], move |ui: Ui, _| {
                let gate = g.clone();
                async move {
                    gate.notified().await;
                    ui.element("label")?.set_text("fresh")?;
                    Ok::<(), Error>(())
                }
            });
            gate.notify_one();
            view.call(&client.ui(), Arguments::new()).await.unwrap();
            app.flush();

            let observer = async {
                tokio::task::yield_now().await;
                // The staging element exists but is not part of any update.
                assert_eq!(client.find_by_tag(STAGING_TAG).len(), 1);
                assert!(app.flush().is_empty());
                gate.notify_one();
            };
            let (result, ()) = tokio::join!(view.refresh(Arguments::new()), observer);
            result.unwrap();

            let flushed = app.flush();
            let elements = flushed[0].payload.as_object().unwrap();
            let tags: Vec<&str> = elements.values().filter_map(|el| el["tag"].as_str()).collect();
            assert!(tags.contains(&ANCHOR_TAG));
            assert!(tags.contains(&"label"));
            assert!(!tags.contains(&STAGING_TAG));
        });
    }

    #[test]
    fn async_refresh_discards_output_for_removed_container() {
        tokio_test::block_on(async {
            let (_app, client) = setup();
            let ui = client.ui();
            let card = ui.element("q-card").unwrap();
            let gate = Rc::new(Notify::new());
            let g = gate.clone();
            let view = AsyncRefreshable::new("slow", &[], move |ui: Ui, _| {
                let gate = g.clone();
                async move {
                    gate.notified().await;
                    ui.element("label")?;
                    Ok::<(), Error>(())
                }
            });
            gate.notify_one();
            let card_ui = ui.fork(card.default_slot());
            view.call(&card_ui, Arguments::new()).await.unwrap();

            let remover = async {
                tokio::task::yield_now().await;
                card.clear().unwrap();
                gate.notify_one();
            };
            let (result, ()) = tokio::join!(view.refresh(Arguments::new()), remover);
            result.unwrap();

            assert!(client.find_by_tag("label").is_empty());
            assert!(client.find_by_tag(STAGING_TAG).is_empty());
            assert_eq!(view.prune(), 1);
        });
    }

    #[tokio::test]
    async fn spawn_refresh_reports_failures() {
        tokio::task::LocalSet::new()
            .run_until(async {
                let (app, client) = setup();
                let reported = Rc::new(RefCell::new(Vec::new()));
                let r = reported.clone();
                app.on_exception(move |err| r.borrow_mut().push(err.clone()));
                let view = AsyncRefreshable::new("some_ui", &["value"], |ui: Ui, args| async move {
                    let value: i64 = args.decode("value")?;
                    ui.element("label")?.set_text(&format!("value={value}"))?;
                    Ok::<(), Error>(())
                });
                view.call(&client.ui(), Arguments::new().arg(0)).await.unwrap();

                view.spawn_refresh(Arguments::new().arg(4)).await.unwrap();
                assert_eq!(texts(&client), vec!["value=4"]);

                view.spawn_refresh(Arguments::new().kwarg("value", 5))
                    .await
                    .unwrap();
                assert_eq!(texts(&client), vec!["value=4"]);
                assert!(matches!(reported.borrow().as_slice(), [Error::Binding { .. }]));
            })
            .await;
    }
}
