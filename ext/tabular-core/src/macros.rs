/// Declare a struct and implement [`TypedRecord`](crate::TypedRecord) and
/// [`FieldType`](crate::FieldType) for it.
///
/// The field-descriptor table is built once per type, on first use.
///
/// ```
/// use tabular_core::{infer_schema, typed_record};
///
/// typed_record! {
///     #[derive(Debug, Clone, PartialEq)]
///     pub struct RawPanda {
///         pub id: i64,
///         pub zip: String,
///         pub happy: bool,
///         pub attributes: Vec<f64>,
///     }
/// }
///
/// let schema = infer_schema::<RawPanda>().unwrap();
/// assert_eq!(schema.field_names(), vec!["id", "zip", "happy", "attributes"]);
/// ```
#[macro_export]
macro_rules! typed_record {
    (
        $(#[$meta:meta])*
        $vis:vis struct $name:ident {
            $(
                $(#[$field_meta:meta])*
                $field_vis:vis $field:ident : $ty:ty
            ),* $(,)?
        }
    ) => {
        $(#[$meta])*
        $vis struct $name {
            $(
                $(#[$field_meta])*
                $field_vis $field: $ty,
            )*
        }

        impl $crate::TypedRecord for $name {
            fn descriptor() -> &'static $crate::RecordDescriptor {
                static DESCRIPTOR: $crate::__private::Lazy<$crate::RecordDescriptor> =
                    $crate::__private::Lazy::new(|| {
                        $crate::RecordDescriptor::new(
                            stringify!($name),
                            vec![$(
                                $crate::FieldDescriptor::new(
                                    stringify!($field),
                                    <$ty as $crate::FieldType>::type_descriptor(),
                                )
                            ),*],
                        )
                    });
                &DESCRIPTOR
            }

            #[allow(unused_variables)]
            fn encode_field(
                &self,
                name: &str,
                data_type: &$crate::DataType,
                path: &str,
            ) -> Option<$crate::Result<$crate::Value>> {
                match name {
                    $(
                        stringify!($field) => Some($crate::FieldType::encode_value(
                            &self.$field,
                            data_type,
                            path,
                        )),
                    )*
                    _ => None,
                }
            }

            #[allow(unused_mut, unused_variables)]
            fn decode_fields(
                values: Vec<$crate::Value>,
                path: &str,
            ) -> $crate::Result<Self> {
                let mut values = values.into_iter();
                Ok(Self {
                    $(
                        $field: $crate::codec::decode_next(&mut values, path, stringify!($field))?,
                    )*
                })
            }
        }

        impl $crate::FieldType for $name {
            fn type_descriptor() -> $crate::TypeDescriptor {
                $crate::TypeDescriptor::Record(<$name as $crate::TypedRecord>::descriptor)
            }

            fn encode_value(
                &self,
                data_type: &$crate::DataType,
                path: &str,
            ) -> $crate::Result<$crate::Value> {
                $crate::codec::encode_nested(self, data_type, path)
            }

            fn decode_value(value: $crate::Value, path: &str) -> $crate::Result<Self> {
                $crate::codec::decode_nested(value, path)
            }
        }
    };
}
