//! # Event bus
//!
//! Named events with typed payloads, dispatched through a tree of
//! [`ComponentManager`]s. A [`Dispatcher`] task owns the tree and processes
//! raised events one at a time, so events reach handlers in the order they
//! were raised. Handlers registered for the same event run concurrently.
//!
//! Leveled events let a leaf address its ancestors: raising an event with
//! level `n` on a sub-manager delivers it `n` managers higher, stamped with
//! the name of the sub-manager it came from.

use std::{
    collections::HashMap,
    fmt::Debug,
    future::Future,
    sync::{Arc, Weak},
};

use anyhow::Context;
use futures::{FutureExt, future::BoxFuture};
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;

use crate::checkers::{PieceType, Player, Pos, Size, Team};

pub mod task_group;

pub use task_group::TaskGroup;

/// Location of a manager in the tree: names of the sub-managers leading to it
pub type Path = Vec<String>;

/// Event payloads
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventData {
    Empty,
    Position(Pos),
    Piece { pos: Pos, piece: PieceType },
    Selection { pos: Pos, selected: bool },
    Movement { from: Pos, to: Pos },
    Flag(bool),
    Player(Player),
    Team(Team),
    ActionComplete { from: Pos, to: Pos, turn: bool },
    InitialConfig { size: Size, turn: bool },
    /// Local only: identifies a connection
    Client(u32),
}

/// Named event
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Event {
    pub name: String,
    pub data: EventData,
    /// Number of managers the event still has to climb
    pub level: u8,
    /// Sub-manager a bubbled event came from
    pub origin: Option<String>,
}

impl Event {
    pub fn new(name: impl Into<String>, data: EventData) -> Self {
        Self {
            name: name.into(),
            data,
            level: 0,
            origin: None,
        }
    }

    pub fn with_level(mut self, level: u8) -> Self {
        self.level = level;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EventError {
    /// The component was removed from its manager
    #[error("component {0} is not bound to a manager")]
    Unbound(String),
    #[error("component {0} is already registered")]
    DuplicateComponent(String),
    #[error("no component named {0}")]
    UnknownComponent(String),
    #[error("event dispatcher is closed")]
    DispatcherClosed,
}

pub type HandlerFuture = BoxFuture<'static, anyhow::Result<()>>;

/// Event handler: receives the event and an emitter bound to the handler's manager
pub type Handler = Arc<dyn Fn(Event, Emitter) -> HandlerFuture + Send + Sync>;

/// Named set of event handlers
pub struct Component {
    name: String,
    handlers: HashMap<String, Vec<Handler>>,
}

impl Component {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            handlers: HashMap::new(),
        }
    }

    /// Registers a handler for the event `name`
    pub fn on<F, Fut>(mut self, name: impl Into<String>, handler: F) -> Self
    where
        F: Fn(Event, Emitter) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        let handler: Handler = Arc::new(move |event, emitter| handler(event, emitter).boxed());
        self.handlers.entry(name.into()).or_default().push(handler);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn handles(&self, name: &str) -> bool {
        self.handlers.contains_key(name)
    }
}

impl Debug for Component {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Component")
            .field("name", &self.name)
            .field("events", &self.handlers.keys().collect::<Vec<_>>())
            .finish()
    }
}

#[derive(Debug)]
enum Node {
    Component {
        component: Component,
        /// Dropped on removal, unbinding the emitters handed to its handlers
        binding: Arc<()>,
    },
    Manager(ComponentManager),
}

impl Node {
    fn name(&self) -> &str {
        match self {
            Node::Component { component, .. } => component.name(),
            Node::Manager(manager) => manager.name(),
        }
    }
}

/// Tree node owning components and sub-managers, in insertion order
#[derive(Debug)]
pub struct ComponentManager {
    name: String,
    nodes: Vec<Node>,
}

impl ComponentManager {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            nodes: Vec::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn contains(&self, name: &str) -> bool {
        self.nodes.iter().any(|node| node.name() == name)
    }

    fn insert(&mut self, node: Node) -> Result<(), EventError> {
        if self.contains(node.name()) {
            return Err(EventError::DuplicateComponent(node.name().to_string()));
        }
        self.nodes.push(node);
        Ok(())
    }

    pub fn add_component(&mut self, component: Component) -> Result<(), EventError> {
        self.insert(Node::Component {
            component,
            binding: Arc::new(()),
        })
    }

    pub fn add_manager(&mut self, manager: ComponentManager) -> Result<(), EventError> {
        self.insert(Node::Manager(manager))
    }

    /// Removes a component or sub-manager together with all its handlers
    pub fn remove(&mut self, name: &str) -> Result<(), EventError> {
        let index = self
            .nodes
            .iter()
            .position(|node| node.name() == name)
            .ok_or_else(|| EventError::UnknownComponent(name.to_string()))?;
        self.nodes.remove(index);
        Ok(())
    }

    /// Names of the direct children, in insertion order
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.nodes.iter().map(Node::name)
    }

    pub fn manager(&self, path: &[String]) -> Option<&ComponentManager> {
        match path.split_first() {
            None => Some(self),
            Some((head, rest)) => self.sub_managers().find(|m| m.name == *head)?.manager(rest),
        }
    }

    pub fn manager_mut(&mut self, path: &[String]) -> Option<&mut ComponentManager> {
        match path.split_first() {
            None => Some(self),
            Some((head, rest)) => self
                .nodes
                .iter_mut()
                .find_map(|node| match node {
                    Node::Manager(manager) if manager.name == *head => Some(manager),
                    _ => None,
                })?
                .manager_mut(rest),
        }
    }

    fn sub_managers(&self) -> impl Iterator<Item = &ComponentManager> {
        self.nodes.iter().filter_map(|node| match node {
            Node::Manager(manager) => Some(manager),
            Node::Component { .. } => None,
        })
    }

    /// Schedules this manager's handlers for `event`, then forwards it to sub-managers
    fn collect_calls(
        &self,
        path: &mut Path,
        event: &Event,
        tx: &mpsc::UnboundedSender<Command>,
        calls: &mut Vec<HandlerFuture>,
    ) {
        let shared_path: Arc<[String]> = path.as_slice().into();
        for node in &self.nodes {
            let Node::Component { component, binding } = node else {
                continue;
            };
            for handler in component.handlers.get(&event.name).into_iter().flatten() {
                let emitter = Emitter {
                    tx: tx.clone(),
                    path: shared_path.clone(),
                    component: component.name.clone(),
                    binding: Arc::downgrade(binding),
                };
                calls.push(handler(event.clone(), emitter));
            }
        }

        for manager in self.sub_managers() {
            path.push(manager.name.clone());
            manager.collect_calls(path, event, tx, calls);
            path.pop();
        }
    }
}

/// Raises events on behalf of a component, on the manager owning it
#[derive(Debug, Clone)]
pub struct Emitter {
    tx: mpsc::UnboundedSender<Command>,
    path: Arc<[String]>,
    component: String,
    binding: Weak<()>,
}

impl Emitter {
    /// Raises an event on the owning manager
    pub fn emit(&self, name: impl Into<String>, data: EventData) -> Result<(), EventError> {
        self.raise(Event::new(name, data))
    }

    pub fn raise(&self, event: Event) -> Result<(), EventError> {
        if self.binding.strong_count() == 0 {
            return Err(EventError::Unbound(self.component.clone()));
        }
        self.tx
            .send(Command::Raise {
                path: self.path.to_vec(),
                event,
            })
            .map_err(|_| EventError::DispatcherClosed)
    }

    /// Path of the owning manager
    pub fn path(&self) -> &[String] {
        &self.path
    }
}

#[derive(Debug)]
enum Command {
    Raise {
        path: Path,
        event: Event,
    },
    AddComponent {
        path: Path,
        component: Component,
        reply: oneshot::Sender<Result<(), EventError>>,
    },
    AddManager {
        path: Path,
        manager: ComponentManager,
        reply: oneshot::Sender<Result<(), EventError>>,
    },
    Remove {
        path: Path,
        name: String,
        reply: oneshot::Sender<Result<(), EventError>>,
    },
}

/// Handle to a running [`Dispatcher`]
#[derive(Debug, Clone)]
pub struct Bus {
    tx: mpsc::UnboundedSender<Command>,
}

impl Bus {
    /// Raises an event on the manager at `path`
    pub fn raise(&self, path: Path, event: Event) -> Result<(), EventError> {
        self.tx
            .send(Command::Raise { path, event })
            .map_err(|_| EventError::DispatcherClosed)
    }

    async fn request(
        &self,
        command: impl FnOnce(oneshot::Sender<Result<(), EventError>>) -> Command,
    ) -> Result<(), EventError> {
        let (reply, response) = oneshot::channel();
        self.tx
            .send(command(reply))
            .map_err(|_| EventError::DispatcherClosed)?;
        response.await.map_err(|_| EventError::DispatcherClosed)?
    }

    pub async fn add_component(&self, path: Path, component: Component) -> Result<(), EventError> {
        self.request(|reply| Command::AddComponent {
            path,
            component,
            reply,
        })
        .await
    }

    pub async fn add_manager(
        &self,
        path: Path,
        manager: ComponentManager,
    ) -> Result<(), EventError> {
        self.request(|reply| Command::AddManager {
            path,
            manager,
            reply,
        })
        .await
    }

    pub async fn remove(&self, path: Path, name: impl Into<String>) -> Result<(), EventError> {
        let name = name.into();
        self.request(|reply| Command::Remove { path, name, reply })
            .await
    }
}

/// Owner of a component tree, processing raised events in order
#[derive(Debug)]
pub struct Dispatcher {
    root: ComponentManager,
    tx: mpsc::UnboundedSender<Command>,
    rx: mpsc::UnboundedReceiver<Command>,
}

impl Dispatcher {
    pub fn new(root: ComponentManager) -> (Self, Bus) {
        let (tx, rx) = mpsc::unbounded_channel();
        let bus = Bus { tx: tx.clone() };
        (Self { root, tx, rx }, bus)
    }

    pub fn root(&self) -> &ComponentManager {
        &self.root
    }

    /// Processes commands until `cancel` fires
    pub async fn run(mut self, cancel: CancellationToken) -> anyhow::Result<()> {
        log::trace!("[{}] Dispatcher started", self.root.name);
        loop {
            let command = tokio::select! {
                _ = cancel.cancelled() => break,
                command = self.rx.recv() => match command {
                    Some(command) => command,
                    None => break,
                },
            };
            self.process(command).await?;
        }
        log::trace!("[{}] Dispatcher stopped", self.root.name);
        Ok(())
    }

    /// Processes every command queued so far, including the ones raised meanwhile
    pub async fn run_until_idle(&mut self) -> anyhow::Result<()> {
        while let Ok(command) = self.rx.try_recv() {
            self.process(command).await?;
        }
        Ok(())
    }

    async fn process(&mut self, command: Command) -> anyhow::Result<()> {
        match command {
            Command::Raise { path, event } => self.dispatch(path, event).await,
            Command::AddComponent {
                path,
                component,
                reply,
            } => {
                let result = match self.root.manager_mut(&path) {
                    Some(manager) => manager.add_component(component),
                    None => Err(EventError::UnknownComponent(path.join("/"))),
                };
                let _ = reply.send(result);
                Ok(())
            }
            Command::AddManager {
                path,
                manager,
                reply,
            } => {
                let result = match self.root.manager_mut(&path) {
                    Some(parent) => parent.add_manager(manager),
                    None => Err(EventError::UnknownComponent(path.join("/"))),
                };
                let _ = reply.send(result);
                Ok(())
            }
            Command::Remove { path, name, reply } => {
                let result = match self.root.manager_mut(&path) {
                    Some(manager) => manager.remove(&name),
                    None => Err(EventError::UnknownComponent(path.join("/"))),
                };
                let _ = reply.send(result);
                Ok(())
            }
        }
    }

    /// Delivers an event raised on the manager at `path`
    async fn dispatch(&mut self, mut path: Path, mut event: Event) -> anyhow::Result<()> {
        // Leveled events climb towards the root
        while event.level > 0 {
            let Some(name) = path.pop() else {
                break;
            };
            event.level -= 1;
            event.origin.get_or_insert(name);
        }

        let Some(manager) = self.root.manager(&path) else {
            log::debug!(
                "[{}] Dropping {} raised on missing manager {path:?}",
                self.root.name,
                event.name
            );
            return Ok(());
        };

        let mut calls = Vec::new();
        manager.collect_calls(&mut path, &event, &self.tx, &mut calls);
        log::trace!(
            "[{}] Dispatching {} to {} handlers",
            self.root.name,
            event.name,
            calls.len()
        );

        // Wait for all handlers, surfacing the first failure
        let results = futures::future::join_all(calls).await;
        results
            .into_iter()
            .collect::<anyhow::Result<Vec<()>>>()
            .with_context(|| format!("Failed to handle event {}", event.name))?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use assert_matches::assert_matches;

    use super::*;

    type Log = Arc<Mutex<Vec<String>>>;

    /// Component recording the events it receives
    fn recorder(name: &str, events: &[&str], log: &Log) -> Component {
        let mut component = Component::new(name);
        for event in events {
            let log = log.clone();
            let tag = format!("{name}:{event}");
            component = component.on(*event, move |event: Event, _| {
                let entry = match &event.origin {
                    Some(origin) => format!("{tag}@{origin}"),
                    None => tag.clone(),
                };
                log.lock().unwrap().push(entry);
                async { anyhow::Ok(()) }
            });
        }
        component
    }

    fn take(log: &Log) -> Vec<String> {
        std::mem::take(&mut *log.lock().unwrap())
    }

    #[tokio::test]
    async fn handlers_match_event_names() {
        let log = Log::default();
        let mut root = ComponentManager::new("root");
        root.add_component(recorder("a", &["ping"], &log)).unwrap();
        root.add_component(recorder("b", &["pong"], &log)).unwrap();
        let (mut dispatcher, bus) = Dispatcher::new(root);

        bus.raise(vec![], Event::new("ping", EventData::Empty)).unwrap();
        bus.raise(vec![], Event::new("pong", EventData::Empty)).unwrap();
        bus.raise(vec![], Event::new("other", EventData::Empty)).unwrap();
        dispatcher.run_until_idle().await.unwrap();

        assert_eq!(take(&log), vec!["a:ping", "b:pong"]);
    }

    #[tokio::test]
    async fn forwarding_and_bubbling() {
        let log = Log::default();
        let mut child = ComponentManager::new("child");
        child.add_component(recorder("leaf", &["ping"], &log)).unwrap();
        let mut root = ComponentManager::new("root");
        root.add_component(recorder("top", &["ping"], &log)).unwrap();
        root.add_manager(child).unwrap();
        let (mut dispatcher, bus) = Dispatcher::new(root);

        // Level 0 on the root reaches the whole tree
        bus.raise(vec![], Event::new("ping", EventData::Empty)).unwrap();
        dispatcher.run_until_idle().await.unwrap();
        assert_eq!(take(&log), vec!["top:ping", "leaf:ping"]);

        // Level 1 on the child climbs to the root, stamped with its origin
        bus.raise(
            vec!["child".to_string()],
            Event::new("ping", EventData::Empty).with_level(1),
        )
        .unwrap();
        dispatcher.run_until_idle().await.unwrap();
        assert_eq!(take(&log), vec!["top:ping@child", "leaf:ping@child"]);

        // Level 0 on the child stays there
        bus.raise(vec!["child".to_string()], Event::new("ping", EventData::Empty))
            .unwrap();
        dispatcher.run_until_idle().await.unwrap();
        assert_eq!(take(&log), vec!["leaf:ping"]);
    }

    #[tokio::test]
    async fn handlers_raise_in_order() {
        let log = Log::default();
        let relay = Component::new("relay").on("start", |_, emitter: Emitter| async move {
            emitter.emit("first", EventData::Flag(true))?;
            emitter.emit("second", EventData::Flag(false))?;
            anyhow::Ok(())
        });
        let mut root = ComponentManager::new("root");
        root.add_component(relay).unwrap();
        root.add_component(recorder("sink", &["first", "second"], &log))
            .unwrap();
        let (mut dispatcher, bus) = Dispatcher::new(root);

        bus.raise(vec![], Event::new("start", EventData::Empty)).unwrap();
        dispatcher.run_until_idle().await.unwrap();
        assert_eq!(take(&log), vec!["sink:first", "sink:second"]);
    }

    #[tokio::test]
    async fn removal_unbinds() {
        let log = Log::default();
        let (emitter_tx, mut emitter_rx) = mpsc::unbounded_channel();
        let keeper = Component::new("keeper").on("ping", move |_, emitter: Emitter| {
            let _ = emitter_tx.send(emitter);
            async { anyhow::Ok(()) }
        });
        let mut root = ComponentManager::new("root");
        root.add_component(keeper).unwrap();
        root.add_component(recorder("other", &["ping"], &log)).unwrap();
        let (mut dispatcher, bus) = Dispatcher::new(root);

        bus.raise(vec![], Event::new("ping", EventData::Empty)).unwrap();
        dispatcher.run_until_idle().await.unwrap();
        let emitter = emitter_rx.recv().await.unwrap();
        assert!(emitter.emit("ping", EventData::Empty).is_ok());
        dispatcher.run_until_idle().await.unwrap();
        assert_eq!(take(&log), vec!["other:ping", "other:ping"]);

        // Remove through the bus while the dispatcher runs
        let cancel = CancellationToken::new();
        let running = tokio::spawn(dispatcher.run(cancel.clone()));
        bus.remove(vec![], "keeper").await.unwrap();
        assert_matches!(
            emitter.emit("ping", EventData::Empty),
            Err(EventError::Unbound(name)) if name == "keeper"
        );
        assert_matches!(
            bus.remove(vec![], "keeper").await,
            Err(EventError::UnknownComponent(_))
        );

        // Only the removed component's handlers are gone
        bus.raise(vec![], Event::new("ping", EventData::Empty)).unwrap();
        bus.add_component(vec![], Component::new("barrier"))
            .await
            .unwrap();
        assert_eq!(take(&log), vec!["other:ping"]);

        cancel.cancel();
        running.await.unwrap().unwrap();
    }

    #[test]
    fn duplicate_names() {
        let mut root = ComponentManager::new("root");
        root.add_component(Component::new("a")).unwrap();
        assert_matches!(
            root.add_component(Component::new("a")),
            Err(EventError::DuplicateComponent(_))
        );
        assert_matches!(
            root.add_manager(ComponentManager::new("a")),
            Err(EventError::DuplicateComponent(_))
        );
        root.add_manager(ComponentManager::new("b")).unwrap();
        assert_eq!(root.names().collect::<Vec<_>>(), vec!["a", "b"]);
    }

    #[tokio::test]
    async fn failures_surface() {
        let root = {
            let mut root = ComponentManager::new("root");
            root.add_component(
                Component::new("broken")
                    .on("ping", |_, _| async { Err::<(), _>(anyhow::anyhow!("handler failed")) }),
            )
            .unwrap();
            root
        };
        let (mut dispatcher, bus) = Dispatcher::new(root);
        bus.raise(vec![], Event::new("ping", EventData::Empty)).unwrap();
        assert!(dispatcher.run_until_idle().await.is_err());
    }
}
