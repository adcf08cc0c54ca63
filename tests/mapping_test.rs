mod common;

use common::PRODUCT_PAYLOAD_UPDATE;
use mssql_capture::mapper::{FieldDescriptor, FieldSetter};
use mssql_capture::payload::{decode_change, RowImage};
use mssql_capture::{scan, scan_into, ChangeOperation, Mappable, MapReport};

#[derive(Debug, Default, Clone, PartialEq)]
struct Product {
    product_id: i64,
    sku: String,
    name: String,
    price: f64,
}

impl Mappable for Product {
    fn fields() -> &'static [FieldDescriptor<Self>] {
        static FIELDS: [FieldDescriptor<Product>; 4] = [
            FieldDescriptor {
                name: "product_id",
                tag: "product_id",
                setter: FieldSetter::Integer(|p, v| p.product_id = v),
            },
            FieldDescriptor {
                name: "sku",
                tag: "SKU",
                setter: FieldSetter::Text(|p, v| p.sku = v),
            },
            FieldDescriptor {
                name: "name",
                tag: "name",
                setter: FieldSetter::Text(|p, v| p.name = v),
            },
            FieldDescriptor {
                name: "price",
                tag: "price",
                setter: FieldSetter::Float(|p, v| p.price = v),
            },
        ];
        &FIELDS
    }
}

#[test]
fn test_update_payload_maps_both_images() {
    let record = decode_change(PRODUCT_PAYLOAD_UPDATE).unwrap();
    assert_eq!(record.operation(), Some(ChangeOperation::Update));

    let before: Product = scan_into(record.old_row().unwrap()).unwrap();
    let after: Product = scan_into(record.new_row().unwrap()).unwrap();

    assert_eq!(
        before,
        Product {
            product_id: 1,
            sku: "W-1".to_string(),
            name: "Widget".to_string(),
            price: 10.0,
        }
    );
    assert_eq!(after.price, 12.5);
    assert_eq!(after.product_id, before.product_id);
}

#[test]
fn test_insert_payload_without_old_values() {
    let record =
        decode_change("<row><NewValues><product_id>7</product_id><name>Gadget</name></NewValues></row>")
            .unwrap();

    assert_eq!(record.operation(), Some(ChangeOperation::Insert));
    assert!(record.old_values.is_empty());

    let mut product = Product::default();
    let report = scan(record.new_row().unwrap(), &mut product).unwrap();

    assert_eq!(report, MapReport { matched: 2, assigned: 2 });
    assert_eq!(product.product_id, 7);
    assert_eq!(product.name, "Gadget");
    // NULL columns are absent from the payload and keep their default
    assert_eq!(product.sku, "");
    assert_eq!(product.price, 0.0);
}

#[test]
fn test_multi_row_update_pairs_on_key_not_position() {
    // Sections written in different row orders by the server.
    let record = decode_change(
        "<row>\
           <OldValues><product_id>2</product_id><price>2.5</price></OldValues>\
           <OldValues><product_id>1</product_id><price>1.5</price></OldValues>\
           <NewValues><product_id>1</product_id><price>1.75</price></NewValues>\
           <NewValues><product_id>2</product_id><price>2.5</price></NewValues>\
         </row>",
    )
    .unwrap();

    assert_eq!(record.operation(), Some(ChangeOperation::Update));
    assert_eq!(record.row_count(), 2);

    let map_all = |images: &[RowImage]| -> Vec<Product> {
        images.iter().map(|image| scan_into(image).unwrap()).collect()
    };
    let before = map_all(&record.old_values);
    let after = map_all(&record.new_values);

    let changed: Vec<i64> = after
        .iter()
        .filter(|new| {
            let old = before
                .iter()
                .find(|old| old.product_id == new.product_id)
                .unwrap();
            old.price != new.price
        })
        .map(|new| new.product_id)
        .collect();

    // Only product 1 changed price; pairing by position would report both.
    assert_eq!(changed, vec![1]);
}

#[test]
fn test_multi_row_delete_maps_each_row() {
    let record = decode_change(
        "<row>\
           <OldValues><product_id>1</product_id><price>1.5</price></OldValues>\
           <OldValues><product_id>2</product_id><price>2.5</price></OldValues>\
         </row>",
    )
    .unwrap();

    assert_eq!(record.operation(), Some(ChangeOperation::Delete));
    let products: Vec<Product> = record
        .old_values
        .iter()
        .map(|image| scan_into(image).unwrap())
        .collect();

    assert_eq!(products.len(), 2);
    assert_eq!(products[0].product_id, 1);
    assert_eq!(products[1].price, 2.5);
}

#[test]
fn test_escaped_text_survives_mapping() {
    let record =
        decode_change("<row><NewValues><name>Nuts &amp; Bolts</name></NewValues></row>").unwrap();
    let product: Product = scan_into(record.new_row().unwrap()).unwrap();
    assert_eq!(product.name, "Nuts & Bolts");
}

#[derive(Debug, Default)]
struct OrderLine {
    line_no: i64,
    unit_price: f64,
}

impl Mappable for OrderLine {
    fn fields() -> &'static [FieldDescriptor<Self>] {
        static FIELDS: [FieldDescriptor<OrderLine>; 2] = [
            FieldDescriptor {
                name: "line_no",
                tag: "line no",
                setter: FieldSetter::Integer(|l, v| l.line_no = v),
            },
            FieldDescriptor {
                name: "unit_price",
                tag: "unit price",
                setter: FieldSetter::Float(|l, v| l.unit_price = v),
            },
        ];
        &FIELDS
    }
}

#[test]
fn test_column_names_with_spaces_match_declared_tags() {
    let record = decode_change(
        "<row><NewValues><line_x0020_no>3</line_x0020_no>\
         <unit_x0020_price>4.5</unit_x0020_price></NewValues></row>",
    )
    .unwrap();

    let line: OrderLine = scan_into(record.new_row().unwrap()).unwrap();
    assert_eq!(line.line_no, 3);
    assert_eq!(line.unit_price, 4.5);
}
