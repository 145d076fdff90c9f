//! JSON-LD side of the event transcoder.
//!
//! The reader walks the document object with a `DeserializeSeed` so that
//! `epcisBody.eventList` is pulled one event at a time straight into the
//! [`EventHandler`]; the list is never materialised. The projectors map
//! an event bag to and from its JSON-LD object form using the shared
//! schema tables.

use std::cell::RefCell;
use std::fmt;
use std::io::Read;
use std::rc::Rc;

use serde::de::{DeserializeSeed, Deserializer, IgnoredAny, MapAccess, SeqAccess, Visitor};
use serde_json::{json, Map, Number, Value};

use crate::collector::EventHandler;
use crate::error::ConvertError;
use crate::event::{
    DocumentEnvelope, EpcisEvent, EventKind, EventMapper, Field, FieldValue, NamespaceMap,
};
use crate::schema;

// ============================================================================
// DOCUMENT READER
// ============================================================================

type ErrorSlot = Rc<RefCell<Option<ConvertError>>>;

/// Streaming reader for EPCIS JSON-LD documents.
#[derive(Default)]
pub struct JsonDocumentReader {
    mapper: Option<EventMapper>,
}

impl JsonDocumentReader {
    pub fn new() -> Self {
        Self::default()
    }

    /// A reader that applies `mapper` to each event before the handler.
    pub fn with_mapper(mapper: EventMapper) -> Self {
        Self {
            mapper: Some(mapper),
        }
    }

    /// Parse `input` and drive `handler` with the envelope and each event.
    pub fn read<R: Read>(
        &self,
        input: R,
        handler: &mut EventHandler<'_>,
    ) -> Result<(), ConvertError> {
        let mut deserializer = serde_json::Deserializer::from_reader(input);
        let slot: ErrorSlot = Rc::new(RefCell::new(None));
        let seed = DocumentSeed {
            mapper: &self.mapper,
            handler: &mut *handler,
            slot: Rc::clone(&slot),
        };
        match seed.deserialize(&mut deserializer) {
            Ok(()) => handler.finish(),
            Err(e) => Err(slot
                .borrow_mut()
                .take()
                .unwrap_or_else(|| ConvertError::json(e.to_string()))),
        }
    }
}

/// Record a typed error and surface it through serde's error channel.
fn stash<E: serde::de::Error>(slot: &ErrorSlot, error: ConvertError) -> E {
    let message = error.to_string();
    *slot.borrow_mut() = Some(error);
    E::custom(message)
}

struct DocumentSeed<'a, 'h> {
    mapper: &'a Option<EventMapper>,
    handler: &'a mut EventHandler<'h>,
    slot: ErrorSlot,
}

impl<'de> DeserializeSeed<'de> for DocumentSeed<'_, '_> {
    type Value = ();

    fn deserialize<D: Deserializer<'de>>(self, deserializer: D) -> Result<(), D::Error> {
        deserializer.deserialize_map(self)
    }
}

impl<'de> Visitor<'de> for DocumentSeed<'_, '_> {
    type Value = ();

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("an EPCIS JSON document object")
    }

    fn visit_map<A: MapAccess<'de>>(self, mut map: A) -> Result<(), A::Error> {
        let Self {
            mapper,
            handler,
            slot,
        } = self;

        let mut envelope = DocumentEnvelope {
            schema_version: "2.0".to_string(),
            ..DocumentEnvelope::default()
        };
        let mut body_seen = false;

        while let Some(key) = map.next_key::<String>()? {
            match key.as_str() {
                "@context" => {
                    let value: Value = map.next_value()?;
                    collect_context(&value, &mut envelope.namespaces);
                }
                "type" => {
                    let value: String = map.next_value()?;
                    if value != "EPCISDocument" {
                        return Err(stash(
                            &slot,
                            ConvertError::json(format!("unsupported document type {value:?}")),
                        ));
                    }
                }
                "schemaVersion" => {
                    let value: Value = map.next_value()?;
                    envelope.schema_version = match value {
                        Value::String(s) => s,
                        other => other.to_string(),
                    };
                }
                "creationDate" => {
                    envelope.creation_date = Some(map.next_value::<String>()?);
                }
                "epcisBody" => {
                    body_seen = true;
                    handler.start(&envelope).map_err(|e| stash(&slot, e))?;
                    map.next_value_seed(BodySeed {
                        mapper,
                        handler: &mut *handler,
                        slot: Rc::clone(&slot),
                    })?;
                }
                _ => {
                    let _: IgnoredAny = map.next_value()?;
                }
            }
        }

        if !body_seen {
            return Err(stash(
                &slot,
                ConvertError::json("document has no epcisBody".to_string()),
            ));
        }
        Ok(())
    }
}

struct BodySeed<'a, 'h> {
    mapper: &'a Option<EventMapper>,
    handler: &'a mut EventHandler<'h>,
    slot: ErrorSlot,
}

impl<'de> DeserializeSeed<'de> for BodySeed<'_, '_> {
    type Value = ();

    fn deserialize<D: Deserializer<'de>>(self, deserializer: D) -> Result<(), D::Error> {
        deserializer.deserialize_map(self)
    }
}

impl<'de> Visitor<'de> for BodySeed<'_, '_> {
    type Value = ();

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("an epcisBody object")
    }

    fn visit_map<A: MapAccess<'de>>(self, mut map: A) -> Result<(), A::Error> {
        let Self {
            mapper,
            handler,
            slot,
        } = self;
        while let Some(key) = map.next_key::<String>()? {
            if key == "eventList" {
                map.next_value_seed(EventListSeed {
                    mapper,
                    handler: &mut *handler,
                    slot: Rc::clone(&slot),
                })?;
            } else {
                let _: IgnoredAny = map.next_value()?;
            }
        }
        Ok(())
    }
}

struct EventListSeed<'a, 'h> {
    mapper: &'a Option<EventMapper>,
    handler: &'a mut EventHandler<'h>,
    slot: ErrorSlot,
}

impl<'de> DeserializeSeed<'de> for EventListSeed<'_, '_> {
    type Value = ();

    fn deserialize<D: Deserializer<'de>>(self, deserializer: D) -> Result<(), D::Error> {
        deserializer.deserialize_seq(self)
    }
}

impl<'de> Visitor<'de> for EventListSeed<'_, '_> {
    type Value = ();

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("an eventList array")
    }

    fn visit_seq<A: SeqAccess<'de>>(self, mut seq: A) -> Result<(), A::Error> {
        while let Some(value) = seq.next_element::<Value>()? {
            let mut event = value_to_event(&value).map_err(|e| stash(&self.slot, e))?;
            if let Some(mapper) = self.mapper {
                event = mapper(event).map_err(|e| stash(&self.slot, e))?;
            }
            self.handler.event(&event).map_err(|e| stash(&self.slot, e))?;
        }
        Ok(())
    }
}

/// Collect `{prefix: uri}` bindings from an `@context` value.
fn collect_context(value: &Value, namespaces: &mut NamespaceMap) {
    match value {
        Value::Array(items) => {
            for item in items {
                collect_context(item, namespaces);
            }
        }
        Value::Object(entries) => {
            for (prefix, uri) in entries {
                if let Some(uri) = uri.as_str() {
                    namespaces.insert(prefix, uri);
                }
            }
        }
        // A bare string is the default EPCIS context.
        _ => {}
    }
}

// ============================================================================
// EVENT → JSON PROJECTION
// ============================================================================

/// Project an event bag onto its JSON-LD object, known fields in 2.0
/// schema order, unknown fields after them in input order.
pub fn event_to_value(event: &EpcisEvent) -> Value {
    let mut obj = Map::new();
    obj.insert("type".to_string(), json!(event.kind.type_name()));

    let order = schema::field_order_2_0(event.kind);
    for name in order {
        for field in event.fields.iter().filter(|f| f.name == *name) {
            let (key, value) = field_to_json(field);
            insert_grouped(&mut obj, key, value);
        }
    }
    for field in event
        .fields
        .iter()
        .filter(|f| !order.contains(&f.name.as_str()))
    {
        let (key, value) = field_to_json(field);
        insert_grouped(&mut obj, key, value);
    }

    Value::Object(obj)
}

/// Insert, turning repeated keys into arrays in input order.
fn insert_grouped(obj: &mut Map<String, Value>, key: String, value: Value) {
    if let Some(existing) = obj.get_mut(&key) {
        if let Value::Array(items) = existing {
            items.push(value);
        } else {
            let first = existing.take();
            *existing = Value::Array(vec![first, value]);
        }
    } else {
        obj.insert(key, value);
    }
}

fn field_to_json(field: &Field) -> (String, Value) {
    let name = field.name.clone();
    let value = if schema::is_epc_list(&field.name) {
        Value::Array(
            field
                .value
                .children()
                .iter()
                .map(|epc| json!(epc.value.as_text().unwrap_or_default()))
                .collect(),
        )
    } else if schema::is_quantity_list(&field.name) {
        Value::Array(
            field
                .value
                .children()
                .iter()
                .map(quantity_to_json)
                .collect(),
        )
    } else if let Some(item) = schema::typed_list_item(&field.name) {
        Value::Array(
            field
                .value
                .children()
                .iter()
                .map(|entry| typed_item_to_json(item, entry))
                .collect(),
        )
    } else if schema::is_id_object(&field.name) {
        let mut obj = Map::new();
        for child in field.value.children() {
            if let Some(text) = child.value.as_text() {
                obj.insert(child.name.clone(), json!(text));
            } else {
                insert_grouped(&mut obj, child.name.clone(), generic_to_json(child));
            }
        }
        Value::Object(obj)
    } else if field.name == "persistentDisposition" {
        let mut obj = Map::new();
        for state in ["set", "unset"] {
            let values: Vec<Value> = field
                .value
                .children()
                .iter()
                .filter(|c| c.name == state)
                .map(|c| json!(c.value.as_text().unwrap_or_default()))
                .collect();
            if !values.is_empty() {
                obj.insert(state.to_string(), Value::Array(values));
            }
        }
        Value::Object(obj)
    } else if field.name == "errorDeclaration" {
        error_declaration_to_json(field)
    } else if field.name == "sensorElementList" {
        Value::Array(
            field
                .value
                .children()
                .iter()
                .map(sensor_element_to_json)
                .collect(),
        )
    } else {
        generic_to_json(field)
    };
    (name, value)
}

fn quantity_to_json(element: &Field) -> Value {
    let mut obj = Map::new();
    if let Some(class) = element.child_text("epcClass") {
        obj.insert("epcClass".to_string(), json!(class));
    }
    if let Some(quantity) = element.child_text("quantity") {
        obj.insert("quantity".to_string(), parse_number(quantity));
    }
    if let Some(uom) = element.child_text("uom") {
        obj.insert("uom".to_string(), json!(uom));
    }
    Value::Object(obj)
}

fn typed_item_to_json(item: &str, entry: &Field) -> Value {
    let mut obj = Map::new();
    if let Some(kind) = entry.attribute("type") {
        obj.insert("type".to_string(), json!(kind));
    }
    obj.insert(
        item.to_string(),
        json!(entry.value.as_text().unwrap_or_default()),
    );
    Value::Object(obj)
}

fn error_declaration_to_json(field: &Field) -> Value {
    let mut obj = Map::new();
    for child in field.value.children() {
        match child.name.as_str() {
            "correctiveEventIDs" => {
                let ids: Vec<Value> = child
                    .value
                    .children()
                    .iter()
                    .map(|id| json!(id.value.as_text().unwrap_or_default()))
                    .collect();
                obj.insert("correctiveEventIDs".to_string(), Value::Array(ids));
            }
            _ => insert_grouped(&mut obj, child.name.clone(), generic_to_json(child)),
        }
    }
    Value::Object(obj)
}

fn sensor_element_to_json(element: &Field) -> Value {
    let mut obj = Map::new();
    for child in element.value.children() {
        let value = if schema::is_attribute_bag(&child.name) {
            attribute_bag_to_json(child)
        } else {
            generic_to_json(child)
        };
        // sensorReport is an array on the wire even with one entry.
        if child.name == "sensorReport" {
            match obj.get_mut("sensorReport") {
                Some(Value::Array(reports)) => reports.push(value),
                _ => {
                    obj.insert("sensorReport".to_string(), Value::Array(vec![value]));
                }
            }
        } else {
            insert_grouped(&mut obj, child.name.clone(), value);
        }
    }
    Value::Object(obj)
}

/// Flatten an attribute-carried element into a JSON object.
fn attribute_bag_to_json(element: &Field) -> Value {
    let mut obj = Map::new();
    for (key, value) in &element.attributes {
        obj.insert(key.clone(), attribute_value_to_json(key, value));
    }
    Value::Object(obj)
}

fn attribute_value_to_json(key: &str, value: &str) -> Value {
    if schema::is_numeric_key(key) {
        parse_number(value)
    } else if schema::is_boolean_key(key) {
        match value {
            "true" => json!(true),
            "false" => json!(false),
            _ => json!(value),
        }
    } else {
        json!(value)
    }
}

/// Structural fallback for `ilmd` and user-defined fields.
fn generic_to_json(field: &Field) -> Value {
    let mut obj = Map::new();
    for (key, value) in &field.attributes {
        obj.insert(format!("@{key}"), json!(value));
    }
    match &field.value {
        FieldValue::Text(text) => {
            if obj.is_empty() {
                json!(text)
            } else {
                obj.insert("#text".to_string(), json!(text));
                Value::Object(obj)
            }
        }
        FieldValue::Children(children) => {
            if children.is_empty() && obj.is_empty() {
                json!("")
            } else {
                for child in children {
                    insert_grouped(&mut obj, child.name.clone(), generic_to_json(child));
                }
                Value::Object(obj)
            }
        }
    }
}

fn parse_number(text: &str) -> Value {
    if let Ok(int) = text.parse::<i64>() {
        return Value::Number(Number::from(int));
    }
    if let Ok(float) = text.parse::<f64>() {
        if let Some(number) = Number::from_f64(float) {
            return Value::Number(number);
        }
    }
    json!(text)
}

// ============================================================================
// JSON → EVENT PROJECTION
// ============================================================================

/// Rebuild an event bag from its JSON-LD object form.
pub fn value_to_event(value: &Value) -> Result<EpcisEvent, ConvertError> {
    let obj = value
        .as_object()
        .ok_or_else(|| ConvertError::json("event is not a JSON object".to_string()))?;
    let type_name = obj
        .get("type")
        .and_then(Value::as_str)
        .ok_or_else(|| ConvertError::json("event has no type".to_string()))?;
    let kind = EventKind::from_type_name(type_name)
        .ok_or_else(|| ConvertError::json(format!("unknown event type {type_name:?}")))?;

    let mut event = EpcisEvent::new(kind);
    for (key, value) in obj {
        if key == "type" {
            continue;
        }
        event.fields.extend(json_to_fields(key, value)?);
    }
    Ok(event)
}

fn json_to_fields(name: &str, value: &Value) -> Result<Vec<Field>, ConvertError> {
    if schema::is_epc_list(name) {
        let epcs = expect_array(name, value)?
            .iter()
            .map(|epc| Field::text("epc", string_of(epc)))
            .collect();
        return Ok(vec![Field::new(name, epcs)]);
    }
    if schema::is_quantity_list(name) {
        let elements = expect_array(name, value)?
            .iter()
            .map(json_to_quantity)
            .collect::<Result<Vec<_>, _>>()?;
        return Ok(vec![Field::new(name, elements)]);
    }
    if let Some(item) = schema::typed_list_item(name) {
        let entries = expect_array(name, value)?
            .iter()
            .map(|entry| json_to_typed_item(item, entry))
            .collect::<Result<Vec<_>, _>>()?;
        return Ok(vec![Field::new(name, entries)]);
    }
    if schema::is_id_object(name) {
        let obj = expect_object(name, value)?;
        let mut children = Vec::new();
        for (key, value) in obj {
            children.extend(generic_to_fields(key, value));
        }
        return Ok(vec![Field::new(name, children)]);
    }
    if name == "persistentDisposition" {
        let obj = expect_object(name, value)?;
        let mut children = Vec::new();
        for state in ["set", "unset"] {
            if let Some(values) = obj.get(state).and_then(Value::as_array) {
                children.extend(values.iter().map(|v| Field::text(state, string_of(v))));
            }
        }
        return Ok(vec![Field::new(name, children)]);
    }
    if name == "errorDeclaration" {
        let obj = expect_object(name, value)?;
        let mut children = Vec::new();
        for (key, value) in obj {
            if key == "correctiveEventIDs" {
                let ids = expect_array(key, value)?
                    .iter()
                    .map(|id| Field::text("correctiveEventID", string_of(id)))
                    .collect();
                children.push(Field::new("correctiveEventIDs", ids));
            } else {
                children.extend(generic_to_fields(key, value));
            }
        }
        return Ok(vec![Field::new(name, children)]);
    }
    if name == "sensorElementList" {
        let elements = expect_array(name, value)?
            .iter()
            .map(json_to_sensor_element)
            .collect::<Result<Vec<_>, _>>()?;
        return Ok(vec![Field::new(name, elements)]);
    }
    Ok(generic_to_fields(name, value))
}

fn json_to_quantity(value: &Value) -> Result<Field, ConvertError> {
    let obj = expect_object("quantity element", value)?;
    let mut children = Vec::new();
    if let Some(class) = obj.get("epcClass") {
        children.push(Field::text("epcClass", string_of(class)));
    }
    if let Some(quantity) = obj.get("quantity") {
        children.push(Field::text("quantity", string_of(quantity)));
    }
    if let Some(uom) = obj.get("uom") {
        children.push(Field::text("uom", string_of(uom)));
    }
    Ok(Field::new("quantityElement", children))
}

fn json_to_typed_item(item: &str, value: &Value) -> Result<Field, ConvertError> {
    let obj = expect_object(item, value)?;
    let text = obj.get(item).map(string_of).unwrap_or_default();
    let mut field = Field::text(item, text);
    if let Some(kind) = obj.get("type") {
        field = field.with_attribute("type", string_of(kind));
    }
    Ok(field)
}

fn json_to_sensor_element(value: &Value) -> Result<Field, ConvertError> {
    let obj = expect_object("sensorElement", value)?;
    let mut children = Vec::new();
    for (key, value) in obj {
        if schema::is_attribute_bag(key) {
            match value {
                Value::Array(items) => {
                    for item in items {
                        children.push(json_to_attribute_bag(key, item)?);
                    }
                }
                _ => children.push(json_to_attribute_bag(key, value)?),
            }
        } else {
            children.extend(generic_to_fields(key, value));
        }
    }
    Ok(Field::new("sensorElement", children))
}

fn json_to_attribute_bag(name: &str, value: &Value) -> Result<Field, ConvertError> {
    let obj = expect_object(name, value)?;
    let mut field = Field::empty(name);
    for (key, value) in obj {
        field = field.with_attribute(key, string_of(value));
    }
    Ok(field)
}

/// Structural fallback; a JSON array becomes repeated sibling elements.
fn generic_to_fields(name: &str, value: &Value) -> Vec<Field> {
    match value {
        Value::Array(items) => items
            .iter()
            .flat_map(|item| generic_to_fields(name, item))
            .collect(),
        Value::Object(entries) => {
            let mut field = Field::empty(name);
            let mut children = Vec::new();
            let mut text = None;
            for (key, value) in entries {
                if let Some(attr) = key.strip_prefix('@') {
                    field = field.with_attribute(attr, string_of(value));
                } else if key == "#text" {
                    text = Some(string_of(value));
                } else {
                    children.extend(generic_to_fields(key, value));
                }
            }
            field.value = match text {
                Some(text) if children.is_empty() => FieldValue::Text(text),
                _ => FieldValue::Children(children),
            };
            vec![field]
        }
        Value::Null => vec![Field::empty(name)],
        other => vec![Field::text(name, string_of(other))],
    }
}

fn string_of(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn expect_array<'v>(name: &str, value: &'v Value) -> Result<&'v Vec<Value>, ConvertError> {
    value
        .as_array()
        .ok_or_else(|| ConvertError::json(format!("{name} must be a JSON array")))
}

fn expect_object<'v>(
    name: &str,
    value: &'v Value,
) -> Result<&'v Map<String, Value>, ConvertError> {
    value
        .as_object()
        .ok_or_else(|| ConvertError::json(format!("{name} must be a JSON object")))
}
