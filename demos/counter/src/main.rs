use std::rc::Rc;

use futures::executor::LocalPool;
use weft_core::prelude::*;
use weft_devtools::Inspector;

fn counter() -> ComponentDefinition {
    ComponentDefinition::new(|cx| {
        format!(
            r#"<h2>{}</h2><button @click="dec">-</button><span>{}</span><button @click="inc">+</button>"#,
            cx.prop("label"),
            cx.get("count"),
        )
    })
    .setup(|cx| {
        let count = cx.signal(0i32);
        let emitter = cx.emitter().clone();
        let inc = count.clone();
        let dec = count.clone();
        let inc_emitter = emitter.clone();
        Ok(Setup::new()
            .signal("count", count)
            .handler("inc", move |_| {
                inc.update(|c| c + 1);
                inc_emitter.emit("changed", inc.get());
            })
            .handler("dec", move |_| {
                dec.update(|c| c - 1);
                emitter.emit("changed", dec.get());
            }))
    })
    .style("span { font-variant-numeric: tabular-nums; }")
}

fn todo_item(id: u32, label: &str) -> Value {
    Value::record([("id", Value::from(id)), ("label", Value::from(label))])
}

fn todos() -> ComponentDefinition {
    ComponentDefinition::new(|cx| {
        let items = cx.get("items").resolved();
        let rows: String = items
            .as_list()
            .unwrap_or_default()
            .iter()
            .map(|item| {
                let id = item.field("id").unwrap_or_default();
                let label = item.field("label").unwrap_or_default();
                format!(
                    r#"<li key="{id}">{}</li>"#,
                    weft_core::html::escape_text(&label.to_string())
                )
            })
            .collect();
        format!(r#"<ul>{rows}</ul><button @click="add">add</button>"#)
    })
    .named("todos")
    .setup(|cx| {
        let items = cx.signal(Value::list([
            todo_item(1, "write the differ"),
            todo_item(2, "test keyed moves"),
            todo_item(3, "ship <it>"),
        ]));
        let next_id = std::cell::Cell::new(4u32);
        let add = items.clone();
        Ok(Setup::new().signal("items", items).handler("add", move |_| {
            let id = next_id.replace(next_id.get() + 1);
            let mut list = add.get().as_list().unwrap_or_default().to_vec();
            list.push(todo_item(id, &format!("task {id}")));
            add.set(Value::list(list));
        }))
    })
}

fn app() -> ComponentDefinition {
    ComponentDefinition::new(|cx| {
        format!(
            r#"<h1>Total: {}</h1><div class="counter" :label="'Left'" @changed="tally"></div><div class="counter" :label="'Right'" @changed="tally"></div><section id="todos"></section>"#,
            cx.get("total"),
        )
    })
    .setup(|cx| {
        let total = cx.signal(0i32);
        let t = total.clone();
        Ok(Setup::new()
            .signal("total", total)
            .handler("tally", move |_| t.update(|n| n + 1))
            .on_mount(Hook::sync(|cx| {
                log::info!("{} mounted", cx.component_name());
                Ok(())
            })))
    })
    .child(".counter", "counter")
    .child("#todos", todos())
}

fn main() -> anyhow::Result<()> {
    env_logger::init();

    let mut pool = LocalPool::new();
    let dom = Rc::new(MemoryDom::new());
    let root = dom.create_element("main");
    let rt = Runtime::new(dom.clone(), pool.spawner());

    let inspector = Inspector::new();
    let mut hud = inspector.hud();
    rt.install(inspector, Value::Null)?;
    rt.register_component("counter", counter())?;
    rt.register_component("app", app())?;

    pool.run_until(rt.mount(root, "app", Props::new()))?;
    println!("{}", dom.inner_html(root));

    let buttons = dom.find_all_tags(root, "button");
    for button in buttons.iter().take(4).rev().take(3) {
        dom.dispatch(*button, &DomEvent::new("click", *button));
        pool.run_until_stalled();
    }
    println!("{}", dom.inner_html(root));

    let app = rt.instance_for(root).ok_or_else(|| anyhow::anyhow!("app is not mounted"))?;
    let list = app
        .children()
        .into_iter()
        .find(|c| c.name() == "todos")
        .ok_or_else(|| anyhow::anyhow!("todo list is not mounted"))?;
    let items = list
        .context()
        .signal::<Value>("items")
        .ok_or_else(|| anyhow::anyhow!("todo list has no items"))?;
    if let Some(add) = dom.find_tag(list.container(), "button") {
        dom.dispatch(add, &DomEvent::new("click", add));
        pool.run_until_stalled();
    }
    let before = dom.find_all_tags(list.container(), "li");
    let remaining: Vec<Value> = items
        .get()
        .as_list()
        .unwrap_or_default()
        .iter()
        .enumerate()
        .filter(|(i, _)| *i != 1)
        .map(|(_, v)| v.clone())
        .collect();
    items.set(Value::list(remaining));
    pool.run_until_stalled();
    let after = dom.find_all_tags(list.container(), "li");
    log::info!(
        "removed the middle todo; kept nodes: {}",
        after.first() == before.first() && after.last() == before.last()
    );
    println!("{}", dom.inner_html(list.container()));

    let overlay = dom.create_element("pre");
    hud.paint(&rt, overlay);
    println!("{}", dom.text_content(overlay));

    pool.run_until(rt.teardown())?;
    let freed = dom.collect(&[root, overlay]);
    log::info!("freed {freed} detached nodes, {} left", dom.node_count());
    Ok(())
}
