use crate::inspection::actions::InspectorAction;
use crate::inspection::focus::FocusListener;
use crate::inspection::listener::InspectionListener;
use crate::inspection::{Inspection, InspectorGui};
use crate::ui::print::style::{
    AddressView, DisabledView, ErrorView, FunctionNameView, KeywordView, ThreadView,
};
use crate::vm::{
    Address, Breakpoint, CodeLocation, HeapObject, MemoryRegion, StackFrame, ThreadId, Watchpoint,
};
use log::debug;
use std::cell::RefCell;
use std::fmt::Write;
use std::rc::Rc;

/// Gui services on top of stdout/stderr.
pub struct ConsoleGui;

impl InspectorGui for ConsoleGui {
    fn error_message(&self, title: &str, message: &str) {
        eprintln!("{}: {}", KeywordView::from(title), ErrorView::from(message));
    }

    fn show_busy(&self, busy: bool) {
        debug!(target: "inspection", "busy: {busy}");
    }
}

/// Console view of the inspection: prints focus changes and VM state changes as they happen.
#[derive(Default)]
pub struct ConsoleView {
    /// Title printed last time, printed again only if changed or forced.
    last_title: RefCell<Option<String>>,
    out: Option<Rc<RefCell<Vec<String>>>>,
}

impl ConsoleView {
    /// View that collects lines instead of printing them.
    pub fn recording(out: Rc<RefCell<Vec<String>>>) -> Self {
        Self {
            last_title: RefCell::default(),
            out: Some(out),
        }
    }

    fn println(&self, line: String) {
        match &self.out {
            Some(out) => out.borrow_mut().push(line),
            None => println!("{line}"),
        }
    }
}

impl FocusListener for ConsoleView {
    fn thread_focus_set(&self, _: Option<ThreadId>, thread: Option<ThreadId>) {
        self.println(format!("thread: {}", ThreadView::from(thread)));
    }

    fn stack_frame_focus_changed(&self, _: Option<&StackFrame>, frame: Option<&StackFrame>) {
        let Some(frame) = frame else {
            return;
        };
        self.println(format!(
            "frame #{}: {} at {}",
            frame.position,
            FunctionNameView::from(frame.function.as_deref()),
            AddressView::from(frame.ip)
        ));
    }

    fn code_location_focus_set(&self, location: &CodeLocation, interactive: bool) {
        let marker = if interactive { " (user)" } else { "" };
        self.println(format!("code: {location}{marker}"));
    }

    fn address_focus_changed(&self, _: Address, address: Address) {
        self.println(format!("address: {}", AddressView::from(address)));
    }

    fn memory_region_focus_changed(&self, _: Option<&MemoryRegion>, region: Option<&MemoryRegion>) {
        self.println(format!("memory region: {}", KeywordView::from(region)));
    }

    fn breakpoint_focus_set(&self, _: Option<&Breakpoint>, breakpoint: Option<&Breakpoint>) {
        self.println(format!("breakpoint: {}", KeywordView::from(breakpoint)));
    }

    fn watchpoint_focus_set(&self, _: Option<&Watchpoint>, watchpoint: Option<&Watchpoint>) {
        self.println(format!("watchpoint: {}", KeywordView::from(watchpoint)));
    }

    fn heap_object_focus_changed(&self, _: Option<&HeapObject>, object: Option<&HeapObject>) {
        let label = object.map(|o| o.id.to_string());
        self.println(format!("object: {}", KeywordView::from(label)));
    }
}

impl InspectionListener for ConsoleView {
    fn vm_state_changed(&self, inspection: &Inspection, force: bool) -> anyhow::Result<()> {
        let title = inspection.current_title();
        let mut last = self.last_title.borrow_mut();
        if force || last.as_deref() != Some(title.as_str()) {
            self.println(format!("== {} ==", KeywordView::from(&title)));
            *last = Some(title);
        }
        Ok(())
    }

    fn thread_state_changed(&self, inspection: &Inspection, thread: ThreadId) {
        let vm = inspection.vm();
        let status = if vm.is_live(thread) { "live" } else { "died" };
        let name = inspection.names().short_thread_name(vm, thread);
        self.println(format!("{}: {status}", ThreadView::from(name)));
    }

    fn breakpoint_state_changed(&self, inspection: &Inspection) {
        self.println(format!(
            "breakpoints: {}",
            inspection.vm().breakpoints().len()
        ));
    }

    fn watchpoint_set_changed(&self, inspection: &Inspection) {
        self.println(format!(
            "watchpoints: {}",
            inspection.vm().watchpoints().len()
        ));
    }

    fn vm_process_terminated(&self, _: &Inspection) {
        self.println(format!("{}", KeywordView::from("VM process terminated")));
    }
}

fn render_action(out: &mut String, key: &str, action: &InspectorAction) {
    let key = format!("{key:<20}");
    if action.is_enabled() {
        _ = writeln!(out, "{} {}", KeywordView::from(key), action.name());
    } else {
        _ = writeln!(
            out,
            "{} {}",
            DisabledView::from(key),
            DisabledView::from(action.name())
        );
    }
}

/// Table of shared actions with their enabled state.
pub fn render_actions(inspection: &Inspection) -> String {
    let mut out = String::new();
    for (kind, action) in inspection.actions().iter() {
        let key: &'static str = kind.into();
        render_action(&mut out, key, action);
    }
    out
}

/// Current focus, one line per category.
pub fn render_focus(inspection: &Inspection) -> String {
    let focus = inspection.focus();
    let names = inspection.names();
    let mut out = String::new();

    let thread = focus
        .thread()
        .map(|t| names.short_thread_name(inspection.vm(), t));
    _ = writeln!(out, "thread:        {}", ThreadView::from(thread));
    let frame = focus.stack_frame().map(|f| names.frame_name(f));
    _ = writeln!(out, "frame:         {}", FunctionNameView::from(frame));
    _ = writeln!(out, "code:          {}", focus.code_location());
    let address = focus.has_address().then(|| focus.address());
    _ = writeln!(out, "address:       {}", AddressView::from(address));
    _ = writeln!(out, "memory region: {}", KeywordView::from(focus.memory_region()));
    _ = writeln!(out, "breakpoint:    {}", KeywordView::from(focus.breakpoint()));
    _ = writeln!(out, "watchpoint:    {}", KeywordView::from(focus.watchpoint()));
    let object = focus.heap_object().map(|o| names.reference_label(o));
    _ = writeln!(out, "object:        {}", KeywordView::from(object));
    out
}
