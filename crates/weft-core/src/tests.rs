use std::cell::{Cell, RefCell};
use std::rc::Rc;

use futures::FutureExt;
use futures::channel::oneshot;
use futures::executor::LocalPool;
use futures::task::LocalSpawnExt;

use crate::*;

fn init_logs() {
    let _ = env_logger::builder().is_test(true).try_init();
}

struct Harness {
    pool: LocalPool,
    dom: Rc<MemoryDom>,
    root: NodeId,
    rt: Runtime,
}

fn harness() -> Harness {
    init_logs();
    let pool = LocalPool::new();
    let dom = Rc::new(MemoryDom::new());
    let root = dom.create_element("div");
    let rt = Runtime::new(dom.clone(), pool.spawner());
    Harness { pool, dom, root, rt }
}

type Log = Rc<RefCell<Vec<String>>>;

fn counter() -> ComponentDefinition {
    ComponentDefinition::new(|cx| {
        format!(
            "<button @click=\"inc\">+</button><span>{}</span>",
            cx.get("count")
        )
    })
    .setup(|cx| {
        let count = cx.signal(0);
        let inc = count.clone();
        Ok(Setup::new()
            .signal("count", count)
            .handler("inc", move |_| inc.update(|n| n + 1)))
    })
}

#[test]
fn test_writes_in_one_run_render_once() {
    let mut h = harness();
    let handle = h
        .pool
        .run_until(h.rt.mount(h.root, counter(), Props::new()))
        .unwrap();
    assert_eq!(h.dom.inner_html(h.root), "<button>+</button><span>0</span>");

    let before = h.rt.stats();
    let count = handle.context().signal::<i32>("count").unwrap();
    count.set(1);
    count.set(2);
    count.set(3);
    assert_eq!(h.rt.pending_renders(), 1);

    h.pool.run_until_stalled();
    let after = h.rt.stats();
    assert_eq!(after.renders - before.renders, 1);
    assert_eq!(after.patches - before.patches, 1);
    assert_eq!(h.dom.inner_html(h.root), "<button>+</button><span>3</span>");
}

#[test]
fn test_click_rebinds_listeners_each_render() {
    let mut h = harness();
    h.pool
        .run_until(h.rt.mount(h.root, counter(), Props::new()))
        .unwrap();
    let button = h.dom.find_tag(h.root, "button").unwrap();

    for _ in 0..2 {
        h.dom.dispatch(button, &DomEvent::new("click", button));
        h.pool.run_until_stalled();
    }
    assert_eq!(h.dom.text_content(h.root), "+2");
    assert_eq!(h.dom.listener_count(), 1);
    // The button itself survived both patches.
    assert_eq!(h.dom.find_tag(h.root, "button"), Some(button));
}

#[test]
fn test_identical_write_schedules_nothing() {
    let mut h = harness();
    let handle = h
        .pool
        .run_until(h.rt.mount(h.root, counter(), Props::new()))
        .unwrap();
    let before = h.rt.stats();

    handle.context().signal::<i32>("count").unwrap().set(0);
    assert_eq!(h.rt.pending_renders(), 0);
    h.pool.run_until_stalled();
    assert_eq!(h.rt.stats(), before);
}

fn list_component(items: Signal<Value>) -> ComponentDefinition {
    ComponentDefinition::new(|cx| {
        let items = cx.get("items").resolved();
        let rows: String = items
            .as_list()
            .unwrap_or_default()
            .iter()
            .map(|v| format!("<li key=\"{v}\">{v}</li>"))
            .collect();
        format!("<ul>{rows}</ul>")
    })
    .setup(move |_| Ok(Setup::new().signal("items", items.clone())))
}

fn strings(items: &[&str]) -> Value {
    Value::list(items.iter().map(|s| Value::from(*s)))
}

#[test]
fn test_keyed_rows_keep_their_nodes() {
    let mut h = harness();
    let items = signal(strings(&["a", "b", "c"]));
    h.pool
        .run_until(h.rt.mount(h.root, list_component(items.clone()), Props::new()))
        .unwrap();
    let before = h.dom.find_all_tags(h.root, "li");
    assert_eq!(before.len(), 3);

    items.set(strings(&["a", "c"]));
    h.pool.run_until_stalled();

    let after = h.dom.find_all_tags(h.root, "li");
    assert_eq!(after, vec![before[0], before[2]]);
    assert_eq!(h.dom.parent(before[1]), None);
    assert_eq!(h.dom.text_content(h.root), "ac");

    items.set(strings(&["c", "b", "a"]));
    h.pool.run_until_stalled();
    let shuffled = h.dom.find_all_tags(h.root, "li");
    assert_eq!(shuffled[0], before[2]);
    assert_eq!(shuffled[2], before[0]);
    assert_eq!(h.dom.text_content(h.root), "cba");
}

fn tracked_child(log: Log) -> ComponentDefinition {
    ComponentDefinition::new(|cx| format!("<b>{}</b>", cx.prop("label")))
        .named("child")
        .setup(move |cx| {
            let label = cx.prop("label").to_string();
            let on_mount = {
                let (log, label) = (log.clone(), label.clone());
                Hook::sync(move |_| {
                    log.borrow_mut().push(format!("mount {label}"));
                    Ok(())
                })
            };
            let on_unmount = {
                let log = log.clone();
                UnmountHook::sync(move |_, _| {
                    log.borrow_mut().push(format!("unmount {label}"));
                    Ok(())
                })
            };
            Ok(Setup::new().on_mount(on_mount).on_unmount(on_unmount))
        })
}

#[test]
fn test_replaced_child_unmounts_before_new_child_mounts() {
    let mut h = harness();
    let log: Log = Rc::default();
    let show_a = signal(true);

    let parent = {
        let show_a = show_a.clone();
        ComponentDefinition::new(|cx| {
            if cx.get("show_a").as_bool() == Some(true) {
                r#"<div class="slot" key="a" :label="'A'"></div>"#.to_string()
            } else {
                r#"<div class="slot" key="b" :label="'B'"></div>"#.to_string()
            }
        })
        .setup(move |_| Ok(Setup::new().signal("show_a", show_a.clone())))
        .child(".slot", tracked_child(log.clone()))
    };

    let handle = h
        .pool
        .run_until(h.rt.mount(h.root, parent, Props::new()))
        .unwrap();
    assert_eq!(h.dom.text_content(h.root), "A");
    assert_eq!(handle.children().len(), 1);
    let first_host = handle.children()[0].container();

    show_a.set(false);
    h.pool.run_until_stalled();

    assert_eq!(*log.borrow(), vec!["mount A", "unmount A", "mount B"]);
    assert_eq!(h.dom.text_content(h.root), "B");
    assert_eq!(handle.children().len(), 1);
    assert!(h.rt.instance_for(first_host).is_none());
    assert!(h.dom.children(first_host).is_empty());
}

/// Hands out a receiver once; later calls get nothing to wait on.
fn gate() -> (oneshot::Sender<()>, Rc<RefCell<Option<oneshot::Receiver<()>>>>) {
    let (tx, rx) = oneshot::channel::<()>();
    (tx, Rc::new(RefCell::new(Some(rx))))
}

async fn pass(gate: Option<oneshot::Receiver<()>>) {
    if let Some(rx) = gate {
        let _ = rx.await;
    }
}

#[test]
fn test_pending_unmount_hook_holds_back_the_replacement() {
    let mut h = harness();
    let log: Log = Rc::default();
    let show_a = signal(true);
    let (tx, rx) = gate();

    let child = {
        let log = log.clone();
        ComponentDefinition::new(|cx| format!("<b>{}</b>", cx.prop("label")))
            .named("child")
            .setup(move |cx| {
                let label = cx.prop("label").to_string();
                let on_mount = {
                    let (log, label) = (log.clone(), label.clone());
                    Hook::sync(move |_| {
                        log.borrow_mut().push(format!("mount {label}"));
                        Ok(())
                    })
                };
                let on_unmount = {
                    let (log, rx) = (log.clone(), rx.clone());
                    UnmountHook::future(move |_, _| {
                        let (log, label, rx) = (log.clone(), label.clone(), rx.borrow_mut().take());
                        async move {
                            pass(rx).await;
                            log.borrow_mut().push(format!("unmount {label}"));
                            Ok::<_, anyhow::Error>(())
                        }
                    })
                };
                Ok(Setup::new().on_mount(on_mount).on_unmount(on_unmount))
            })
    };
    let parent = {
        let show_a = show_a.clone();
        ComponentDefinition::new(|cx| {
            if cx.get("show_a").as_bool() == Some(true) {
                r#"<div class="slot" key="a" :label="'A'"></div>"#.to_string()
            } else {
                r#"<div class="slot" key="b" :label="'B'"></div>"#.to_string()
            }
        })
        .setup(move |_| Ok(Setup::new().signal("show_a", show_a.clone())))
        .child(".slot", child)
    };

    let handle = h
        .pool
        .run_until(h.rt.mount(h.root, parent, Props::new()))
        .unwrap();
    show_a.set(false);
    h.pool.run_until_stalled();

    assert_eq!(*log.borrow(), vec!["mount A"]);
    assert_eq!(handle.children().len(), 1);
    assert_eq!(handle.children()[0].state(), LifecycleState::Unmounting);

    tx.send(()).unwrap();
    h.pool.run_until_stalled();
    assert_eq!(*log.borrow(), vec!["mount A", "unmount A", "mount B"]);
    assert_eq!(h.dom.text_content(h.root), "B");
    assert_eq!(handle.children().len(), 1);
}

#[test]
fn test_host_that_stops_matching_swaps_its_child() {
    let mut h = harness();
    let use_a = signal(true);
    let parent = {
        let use_a = use_a.clone();
        ComponentDefinition::new(|cx| {
            let class = if cx.get("use_a").as_bool() == Some(true) { "a" } else { "b" };
            format!(r#"<div class="{class}"></div>"#)
        })
        .setup(move |_| Ok(Setup::new().signal("use_a", use_a.clone())))
        .child(".a", ComponentDefinition::new(|_| "<b>A</b>".into()).named("a"))
        .child(".b", ComponentDefinition::new(|_| "<i>B</i>".into()).named("b"))
    };

    let handle = h
        .pool
        .run_until(h.rt.mount(h.root, parent, Props::new()))
        .unwrap();
    assert_eq!(h.dom.inner_html(h.root), r#"<div class="a"><b>A</b></div>"#);
    let host = handle.children()[0].container();
    let first = handle.children()[0].clone();

    use_a.set(false);
    h.pool.run_until_stalled();

    assert_eq!(h.dom.inner_html(h.root), r#"<div class="b"><i>B</i></div>"#);
    let names: Vec<String> = handle.children().iter().map(|c| c.name().to_string()).collect();
    assert_eq!(names, vec!["b"]);
    assert_eq!(handle.children()[0].container(), host);
    assert_eq!(first.state(), LifecycleState::Unmounted);
}

#[test]
fn test_parent_rerender_keeps_child_content() {
    let mut h = harness();
    let title = signal("one".to_string());

    let parent = {
        let title = title.clone();
        ComponentDefinition::new(|cx| {
            format!("<h1>{}</h1><section id=\"inner\"></section>", cx.get("title"))
        })
        .setup(move |_| Ok(Setup::new().signal("title", title.clone())))
        .child("#inner", counter())
    };
    let handle = h
        .pool
        .run_until(h.rt.mount(h.root, parent, Props::new()))
        .unwrap();
    let child = handle.children()[0].clone();
    child.context().signal::<i32>("count").unwrap().set(7);
    h.pool.run_until_stalled();

    title.set("two".to_string());
    h.pool.run_until_stalled();

    assert_eq!(
        h.dom.inner_html(h.root),
        r#"<h1>two</h1><section id="inner"><button>+</button><span>7</span></section>"#
    );
    assert!(child.is_mounted());
    assert_eq!(child.parent(), Some(handle.id()));
}

#[test]
fn test_flush_renders_parents_before_children() {
    let mut h = harness();
    let order: Log = Rc::default();
    let a = signal(0);
    let b = signal(0);

    let child = {
        let (b, order) = (b.clone(), order.clone());
        ComponentDefinition::new(|cx| format!("<i>{}</i>", cx.get("b"))).setup(move |_| {
            let order = order.clone();
            Ok(Setup::new()
                .signal("b", b.clone())
                .on_update(Hook::sync(move |_| {
                    order.borrow_mut().push("child".into());
                    Ok(())
                })))
        })
    };
    let parent = {
        let (a, order) = (a.clone(), order.clone());
        ComponentDefinition::new(|cx| format!("<p>{}</p><span class=\"c\"></span>", cx.get("a")))
            .setup(move |_| {
                let order = order.clone();
                Ok(Setup::new()
                    .signal("a", a.clone())
                    .on_update(Hook::sync(move |_| {
                        order.borrow_mut().push("parent".into());
                        Ok(())
                    })))
            })
            .child(".c", child)
    };
    h.pool
        .run_until(h.rt.mount(h.root, parent, Props::new()))
        .unwrap();

    b.set(1);
    a.set(1);
    h.pool.run_until_stalled();

    assert_eq!(*order.borrow(), vec!["parent", "child"]);
    assert_eq!(h.dom.text_content(h.root), "11");
}

#[test]
fn test_child_emits_to_parent_binding() {
    let mut h = harness();
    let received: Log = Rc::default();

    let child = ComponentDefinition::new(|_| "<button @click=\"save\">save</button>".into())
        .setup(|cx| {
            let emitter = cx.emitter().clone();
            let label = cx.prop("label");
            Ok(Setup::new().handler("save", move |_| emitter.emit("saved", label.clone())))
        });
    let parent = {
        let received = received.clone();
        ComponentDefinition::new(|_| {
            r#"<div class="editor" :label="'draft'" @saved="on_saved"></div>"#.into()
        })
        .setup(move |_| {
            let received = received.clone();
            Ok(Setup::new().handler("on_saved", move |ev| {
                received.borrow_mut().push(ev.detail.to_string())
            }))
        })
        .child(".editor", child)
    };
    h.pool
        .run_until(h.rt.mount(h.root, parent, Props::new()))
        .unwrap();

    let button = h.dom.find_tag(h.root, "button").unwrap();
    h.dom.dispatch(button, &DomEvent::new("click", button));
    assert_eq!(*received.borrow(), vec!["draft"]);
}

#[test]
fn test_unmount_round_trip() {
    let mut h = harness();
    let handle = h
        .pool
        .run_until(h.rt.mount(h.root, counter(), Props::new()))
        .unwrap();
    let count = handle.context().signal::<i32>("count").unwrap();
    assert_eq!(count.subscriber_count(), 1);

    h.pool.run_until(h.rt.unmount_container(h.root)).unwrap();
    assert!(h.dom.children(h.root).is_empty());
    assert_eq!(count.subscriber_count(), 0);
    assert_eq!(h.dom.listener_count(), 0);
    assert!(h.rt.instance_for(h.root).is_none());
    assert_eq!(handle.state(), LifecycleState::Unmounted);

    let renders = h.rt.stats().renders;
    count.set(9);
    h.pool.run_until_stalled();
    assert_eq!(h.rt.stats().renders, renders);

    // Unmounting again is a no-op.
    h.pool.run_until(handle.unmount()).unwrap();
    assert!(matches!(
        h.pool.run_until(h.rt.unmount_container(h.root)),
        Err(RuntimeError::NotMounted(_))
    ));

    let fresh = h
        .pool
        .run_until(h.rt.mount(h.root, counter(), Props::new()))
        .unwrap();
    assert!(!fresh.ptr_eq(&handle));
    assert_eq!(h.dom.inner_html(h.root), "<button>+</button><span>0</span>");
}

#[test]
fn test_second_mount_returns_existing_instance() {
    let mut h = harness();
    let setups = Rc::new(Cell::new(0));
    let def = {
        let setups = setups.clone();
        Rc::new(ComponentDefinition::new(|_| "<p>x</p>".into()).setup(move |_| {
            setups.set(setups.get() + 1);
            Ok(Setup::new())
        }))
    };

    let first = h
        .pool
        .run_until(h.rt.mount(h.root, def.clone(), Props::new()))
        .unwrap();
    let second = h
        .pool
        .run_until(h.rt.mount(h.root, def, Props::new()))
        .unwrap();
    assert!(first.ptr_eq(&second));
    assert_eq!(setups.get(), 1);
}

#[test]
fn test_setup_failure_leaves_nothing_behind() {
    let mut h = harness();
    let failing = ComponentDefinition::new(|_| "<p>never</p>".into())
        .setup(|_| Err(anyhow::anyhow!("no data")));
    let err = h
        .pool
        .run_until(h.rt.mount(h.root, failing, Props::new()))
        .unwrap_err();
    assert!(matches!(err, RuntimeError::Setup { .. }));
    assert!(h.dom.children(h.root).is_empty());
    assert!(h.rt.instance_for(h.root).is_none());

    let reserved = ComponentDefinition::new(|_| String::new())
        .setup(|_| Ok(Setup::new().value("props", 1)));
    let err = h
        .pool
        .run_until(h.rt.mount(h.root, reserved, Props::new()))
        .unwrap_err();
    assert!(matches!(err, RuntimeError::ReservedName { name, .. } if name == "props"));

    let err = h
        .pool
        .run_until(h.rt.mount(h.root, "unregistered", Props::new()))
        .unwrap_err();
    assert!(matches!(err, RuntimeError::UnknownComponent(_)));
}

#[test]
fn test_mount_hook_error_leaves_instance_mounted() {
    let mut h = harness();
    let def = ComponentDefinition::new(|cx| format!("<p>{}</p>", cx.get("n"))).setup(|cx| {
        Ok(Setup::new()
            .signal("n", cx.signal(1))
            .on_mount(Hook::sync(|_| Err(anyhow::anyhow!("offline")))))
    });
    let err = h
        .pool
        .run_until(h.rt.mount(h.root, def, Props::new()))
        .unwrap_err();
    assert!(matches!(
        err,
        RuntimeError::Hook { hook: HookKind::Mount, .. }
    ));
    assert_eq!(h.dom.inner_html(h.root), "<p>1</p>");

    let handle = h.rt.instance_for(h.root).unwrap();
    assert_eq!(handle.state(), LifecycleState::Mounted);
    assert_eq!(h.rt.stats().mounts, 1);

    handle.context().signal::<i32>("n").unwrap().set(2);
    h.pool.run_until_stalled();
    assert_eq!(h.dom.inner_html(h.root), "<p>2</p>");

    h.pool.run_until(h.rt.unmount_container(h.root)).unwrap();
    assert!(h.dom.children(h.root).is_empty());
    assert!(h.rt.instances().is_empty());
}

#[test]
fn test_bad_binding_does_not_abort_render() {
    let mut h = harness();
    let def = ComponentDefinition::new(|_| {
        r#"<p @click="missing">x</p><i :tone="'ok'"></i>"#.into()
    });
    h.pool
        .run_until(h.rt.mount(h.root, def, Props::new()))
        .unwrap();

    assert_eq!(h.rt.stats().binding_errors, 1);
    let i = h.dom.find_tag(h.root, "i").unwrap();
    assert_eq!(h.dom.property(i, "tone").map(|v| v.to_string()), Some("ok".into()));
    assert_eq!(h.dom.inner_html(h.root), "<p>x</p><i></i>");
}

#[test]
fn test_pending_before_mount_does_not_hold_back_the_patch() {
    let mut h = harness();
    let (tx, rx) = oneshot::channel::<()>();
    let rx = Rc::new(RefCell::new(Some(rx)));
    let mounted = Rc::new(Cell::new(false));

    let def = {
        let mounted = mounted.clone();
        ComponentDefinition::new(|_| "<p>ready</p>".into()).setup(move |_| {
            let rx = rx.clone();
            let mounted = mounted.clone();
            Ok(Setup::new()
                .on_before_mount(Hook::future(move |_| {
                    let rx = rx.borrow_mut().take();
                    async move {
                        if let Some(rx) = rx {
                            let _ = rx.await;
                        }
                        Ok::<_, anyhow::Error>(())
                    }
                }))
                .on_mount(Hook::sync(move |_| {
                    mounted.set(true);
                    Ok(())
                })))
        })
    };

    let slot: Rc<RefCell<Option<Result<ComponentHandle>>>> = Rc::default();
    {
        let (rt, root, slot) = (h.rt.clone(), h.root, slot.clone());
        h.pool
            .spawner()
            .spawn_local(async move {
                let r = rt.mount(root, def, Props::new()).await;
                *slot.borrow_mut() = Some(r);
            })
            .unwrap();
    }
    h.pool.run_until_stalled();

    assert_eq!(h.dom.inner_html(h.root), "<p>ready</p>");
    assert!(!mounted.get());
    assert!(slot.borrow().is_none());

    tx.send(()).unwrap();
    h.pool.run_until_stalled();
    assert!(mounted.get());
    assert!(matches!(*slot.borrow(), Some(Ok(_))));
}

type MountSlot = Rc<RefCell<Option<Result<ComponentHandle>>>>;

fn spawn_mount(h: &Harness, def: ComponentDefinition) -> MountSlot {
    let slot: MountSlot = Rc::default();
    let (rt, root, out) = (h.rt.clone(), h.root, slot.clone());
    h.pool
        .spawner()
        .spawn_local(async move {
            let r = rt.mount(root, def, Props::new()).await;
            *out.borrow_mut() = Some(r);
        })
        .unwrap();
    slot
}

#[test]
fn test_unmount_during_pending_before_mount_skips_remaining_steps() {
    let mut h = harness();
    let (tx, rx) = gate();
    let clicks = Rc::new(Cell::new(0));
    let def = {
        let clicks = clicks.clone();
        ComponentDefinition::new(|_| r#"<button @click="hit">go</button>"#.into())
            .style("button { color: red }")
            .setup(move |_| {
                let (rx, clicks) = (rx.clone(), clicks.clone());
                Ok(Setup::new()
                    .handler("hit", move |_| clicks.set(clicks.get() + 1))
                    .on_before_mount(Hook::future(move |_| {
                        let rx = rx.borrow_mut().take();
                        async move {
                            pass(rx).await;
                            Ok::<_, anyhow::Error>(())
                        }
                    })))
            })
    };

    let slot = spawn_mount(&h, def);
    h.pool.run_until_stalled();
    assert_eq!(h.dom.inner_html(h.root), "<button>go</button>");

    h.pool.run_until(h.rt.unmount_container(h.root)).unwrap();
    tx.send(()).unwrap();
    h.pool.run_until_stalled();

    assert!(matches!(*slot.borrow(), Some(Ok(_))));
    assert!(h.dom.children(h.root).is_empty());
    assert_eq!(h.dom.listener_count(), 0);
    assert!(h.rt.instances().is_empty());
    assert_eq!(clicks.get(), 0);
}

#[test]
fn test_child_mounting_when_parent_unmounts_is_torn_down() {
    let mut h = harness();
    let (tx, rx) = gate();
    let n = signal(0);
    let child = {
        let n = n.clone();
        ComponentDefinition::new(|cx| format!("<i>{}</i>", cx.get("n")))
            .named("child")
            .setup(move |_| {
                let rx = rx.clone();
                Ok(Setup::new()
                    .signal("n", n.clone())
                    .on_mount(Hook::future(move |_| {
                        let rx = rx.borrow_mut().take();
                        async move {
                            pass(rx).await;
                            Ok::<_, anyhow::Error>(())
                        }
                    })))
            })
    };
    let parent = ComponentDefinition::new(|_| r#"<div class="c"></div>"#.into()).child(".c", child);

    let slot = spawn_mount(&h, parent);
    h.pool.run_until_stalled();
    assert_eq!(h.rt.instances().len(), 2);
    assert_eq!(n.subscriber_count(), 1);

    h.pool.run_until(h.rt.unmount_container(h.root)).unwrap();
    assert!(h.rt.instances().is_empty());
    tx.send(()).unwrap();
    h.pool.run_until_stalled();

    assert!(matches!(*slot.borrow(), Some(Ok(_))));
    assert!(h.rt.instances().is_empty());
    assert_eq!(n.subscriber_count(), 0);
    assert!(h.dom.children(h.root).is_empty());

    let renders = h.rt.stats().renders;
    n.set(5);
    h.pool.run_until_stalled();
    assert_eq!(h.rt.stats().renders, renders);
}

#[test]
fn test_writes_during_mount_render_after_it() {
    let mut h = harness();
    let def = ComponentDefinition::new(|cx| format!("<p>{}</p>", cx.get("n"))).setup(|cx| {
        let n = cx.signal(1);
        let bump = n.clone();
        Ok(Setup::new().signal("n", n).on_mount(Hook::sync(move |_| {
            bump.set(2);
            Ok(())
        })))
    });
    h.pool
        .run_until(h.rt.mount(h.root, def, Props::new()))
        .unwrap();
    h.pool.run_until_stalled();
    assert_eq!(h.dom.inner_html(h.root), "<p>2</p>");
}

#[test]
fn test_dynamic_style_is_injected_and_updated() {
    let mut h = harness();
    let color = signal("red".to_string());
    let def = {
        let color = color.clone();
        ComponentDefinition::new(|_| "<p>x</p>".into())
            .setup(move |_| Ok(Setup::new().signal("color", color.clone())))
            .style_with(|cx| format!("p {{ color: {} }}", cx.get("color")))
    };
    h.rt.register_component("badge", def).unwrap();
    h.pool
        .run_until(h.rt.mount(h.root, "badge", Props::new()))
        .unwrap();
    insta::assert_snapshot!(
        h.dom.inner_html(h.root),
        @r#"<style data-weft-style="badge">p { color: red }</style><p>x</p>"#
    );
    let style = h.dom.find_tag(h.root, "style").unwrap();

    color.set("blue".to_string());
    h.pool.run_until_stalled();
    assert_eq!(h.dom.find_tag(h.root, "style"), Some(style));
    assert_eq!(h.dom.text_content(style), "p { color: blue }");
    assert_eq!(h.dom.children(h.root).len(), 2);
}

struct Tracer {
    name: &'static str,
    log: Log,
}

impl Plugin for Tracer {
    fn name(&self) -> &str {
        self.name
    }

    fn install(&self, installer: &mut Installer<'_>, _options: &Value) -> anyhow::Result<()> {
        let (name, log) = (self.name, self.log.clone());
        installer.wrap_mount(move |req, next| {
            log.borrow_mut().push(format!("{name} enter"));
            let log = log.clone();
            async move {
                let result = next(req).await;
                log.borrow_mut().push(format!("{name} exit"));
                result
            }
            .boxed_local()
        });
        Ok(())
    }
}

#[test]
fn test_plugins_wrap_newest_outermost() {
    let mut h = harness();
    let log: Log = Rc::default();
    h.rt.install(Tracer { name: "a", log: log.clone() }, Value::Null)
        .unwrap();
    h.rt.install(Tracer { name: "b", log: log.clone() }, Value::Null)
        .unwrap();
    assert!(matches!(
        h.rt.install(Tracer { name: "a", log: log.clone() }, Value::Null),
        Err(RuntimeError::DuplicatePlugin(_))
    ));

    h.pool
        .run_until(h.rt.mount(h.root, counter(), Props::new()))
        .unwrap();
    assert_eq!(*log.borrow(), vec!["b enter", "a enter", "a exit", "b exit"]);

    log.borrow_mut().clear();
    h.rt.uninstall("b").unwrap();
    let other = h.dom.create_element("div");
    h.pool
        .run_until(h.rt.mount(other, counter(), Props::new()))
        .unwrap();
    assert_eq!(*log.borrow(), vec!["a enter", "a exit"]);
    assert!(matches!(
        h.rt.uninstall("b"),
        Err(RuntimeError::UnknownPlugin(_))
    ));
}

#[test]
fn test_teardown_unmounts_and_uninstalls() {
    let mut h = harness();
    let log: Log = Rc::default();
    h.rt.install(Tracer { name: "a", log }, Value::Null).unwrap();
    h.rt.register_component("counter", counter()).unwrap();
    h.pool
        .run_until(h.rt.mount(h.root, "counter", Props::new()))
        .unwrap();

    h.pool.run_until(h.rt.teardown()).unwrap();
    assert!(h.dom.children(h.root).is_empty());
    assert!(h.rt.plugins().is_empty());
    assert!(h.rt.component("counter").is_none());
    assert!(matches!(
        h.pool.run_until(h.rt.mount(h.root, counter(), Props::new())),
        Err(RuntimeError::TornDown)
    ));
}
